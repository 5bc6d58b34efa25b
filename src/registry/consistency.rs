//! Cache Consistency State Machine
//!
//! Tracks whether the local mirrors of service-center data can be trusted.
//!
//! ```text
//!   AVAILABLE ──exception──────────▶ DEGRADED
//!       ▲                               │
//!       └────recovery (cascade)─────────┘
//!
//!   AVAILABLE ──recovery──▶ AVAILABLE      no-op
//!   DEGRADED  ──exception─▶ DEGRADED       no-op
//! ```
//!
//! The recovery edge is a single compare-exchange, so of any number of
//! racing recovery signals exactly one wins and dispatches the cascade. The
//! cascade itself runs on a worker task; signal handlers only enqueue it.

use crate::domain::ports::{CacheManagerRef, EndpointSelectorRef};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// =============================================================================
// Consistency State
// =============================================================================

/// Whether mirrored data is consistent with the service center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConsistencyState {
    Available = 0,
    Degraded = 1,
}

impl ConsistencyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsistencyState::Available,
            _ => ConsistencyState::Degraded,
        }
    }
}

impl std::fmt::Display for ConsistencyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyState::Available => write!(f, "available"),
            ConsistencyState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Atomic two-state machine
#[derive(Debug)]
pub struct ConsistencyMachine {
    state: AtomicU8,
}

impl ConsistencyMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConsistencyState::Available as u8),
        }
    }

    pub fn state(&self) -> ConsistencyState {
        ConsistencyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Enter DEGRADED. Returns true if the state changed.
    pub fn degrade(&self) -> bool {
        let previous = self
            .state
            .swap(ConsistencyState::Degraded as u8, Ordering::AcqRel);
        previous == ConsistencyState::Available as u8
    }

    /// Leave DEGRADED. Returns true only for the caller that performed the
    /// DEGRADED -> AVAILABLE transition; that caller owns the cascade.
    pub fn recover(&self) -> bool {
        self.state
            .compare_exchange(
                ConsistencyState::Degraded as u8,
                ConsistencyState::Available as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for ConsistencyMachine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Cache Collaborators
// =============================================================================

/// The caches invalidated by the cascade
#[derive(Clone)]
pub struct CacheCollaborators {
    pub instance_cache: CacheManagerRef,
    pub endpoint_selector: EndpointSelectorRef,
    pub instance_version_cache: CacheManagerRef,
}

impl CacheCollaborators {
    /// Invalidate every cache. Order is fixed: instance cache, endpoint
    /// selector, instance-version cache.
    pub fn invalidate_all(&self) {
        self.instance_cache.clean_up();
        self.endpoint_selector.clear_instance_cache();
        self.instance_version_cache.clean_up();
    }
}

impl std::fmt::Debug for CacheCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCollaborators")
            .field("instance_cache", &self.instance_cache.name())
            .field("instance_version_cache", &self.instance_version_cache.name())
            .finish()
    }
}

// =============================================================================
// Cascade Worker
// =============================================================================

#[derive(Debug)]
struct CascadeRequest {
    sequence: u64,
}

/// Handle to the task that runs invalidation cascades
#[derive(Debug)]
pub struct CascadeHandle {
    tx: mpsc::UnboundedSender<CascadeRequest>,
    dispatched: AtomicU64,
    completed: watch::Receiver<u64>,
    worker: JoinHandle<()>,
}

impl CascadeHandle {
    /// Spawn the cascade worker. Must be called inside a tokio runtime.
    pub fn spawn(caches: CacheCollaborators) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CascadeRequest>();
        let (completed_tx, completed) = watch::channel(0u64);

        let worker = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                caches.invalidate_all();
                completed_tx.send_modify(|count| *count += 1);
                info!(
                    cascade = request.sequence,
                    "Reconnected to service center, cleaned up mirrored instance caches"
                );
            }
            debug!("Cascade worker stopped");
        });

        Self {
            tx,
            dispatched: AtomicU64::new(0),
            completed,
            worker,
        }
    }

    /// Queue one cascade
    pub fn dispatch(&self) {
        let sequence = self.dispatched.fetch_add(1, Ordering::AcqRel) + 1;
        if self.tx.send(CascadeRequest { sequence }).is_err() {
            warn!(cascade = sequence, "Cascade worker gone, invalidation dropped");
        }
    }

    /// Cascades queued so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Cascades finished so far
    pub fn completed(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Wait until at least `count` cascades have finished
    pub async fn wait_for(&self, count: u64) {
        let mut completed = self.completed.clone();
        let _ = completed.wait_for(|done| *done >= count).await;
    }
}

impl Drop for CascadeHandle {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
