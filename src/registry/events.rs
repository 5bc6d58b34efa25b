//! Registry Events
//!
//! Signals exchanged between the registration task, the registry coordinator
//! and anything else that needs to react to service-center connectivity or
//! process shutdown.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events carried by the registry event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A call to the service center failed; mirrored data may be stale
    Exception { source: String, reason: String },

    /// The service center is reachable again after a failure
    Recovery { source: String },

    /// The process is shutting down; stop sending traffic
    Shutdown,

    /// A local microservice received its remote service id
    MicroserviceRegistered {
        service_name: String,
        service_id: String,
    },

    /// A local instance received its remote instance id
    InstanceRegistered {
        service_id: String,
        instance_id: String,
    },
}

impl RegistryEvent {
    pub fn exception(source: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryEvent::Exception {
            source: source.into(),
            reason: reason.into(),
        }
    }

    pub fn recovery(source: impl Into<String>) -> Self {
        RegistryEvent::Recovery {
            source: source.into(),
        }
    }

    /// Check if this event changes cache consistency
    pub fn is_connectivity_event(&self) -> bool {
        matches!(
            self,
            RegistryEvent::Exception { .. } | RegistryEvent::Recovery { .. }
        )
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::Exception { .. } => "exception",
            RegistryEvent::Recovery { .. } => "recovery",
            RegistryEvent::Shutdown => "shutdown",
            RegistryEvent::MicroserviceRegistered { .. } => "microservice_registered",
            RegistryEvent::InstanceRegistered { .. } => "instance_registered",
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Publish/subscribe bus shared by the registry components.
///
/// Every subscriber receives every event posted after it subscribed. Delivery
/// threading belongs to the subscribers: each one drains its own receiver.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    /// Post an event to all current subscribers. Returns how many received it.
    pub fn post(&self, event: RegistryEvent) -> usize {
        let kind = event.kind();
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(event = kind, subscribers = delivered, "Posted registry event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
