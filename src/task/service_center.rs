//! Service-Center Task
//!
//! Root of the registration task tree. Holds one
//! [`MicroserviceRegisterTask`] per local microservice, starts them on
//! `init`, and stops all of them when a `Shutdown` event is posted.

use crate::registry::events::{EventBus, RegistryEvent};
use crate::task::microservice::MicroserviceRegisterTask;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Root task owning every microservice registration task
pub struct ServiceCenterTask {
    bus: EventBus,
    tasks: Mutex<Vec<Arc<MicroserviceRegisterTask>>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ServiceCenterTask {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Add a child task; children added after `init` are not started
    pub fn add_microservice_task(&self, task: Arc<MicroserviceRegisterTask>) {
        if self.started.load(Ordering::Acquire) {
            warn!(
                service = task.microservice().service_name(),
                "Registration task added after start, ignoring"
            );
            return;
        }
        self.tasks.lock().push(task);
    }

    pub fn tasks(&self) -> Vec<Arc<MicroserviceRegisterTask>> {
        self.tasks.lock().clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Start every child task. Returns immediately; registration proceeds
    /// in the background. Later calls are no-ops.
    pub fn init(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Service-center task already started");
            return;
        }

        // Subscribe before spawning so a Shutdown posted right after init is seen
        let mut events = self.bus.subscribe();
        let cancel = self.cancel.clone();
        let watcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(RegistryEvent::Shutdown) => {
                            info!("Shutdown received, stopping registration tasks");
                            cancel.cancel();
                            break;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "Shutdown watcher lagged, relying on an explicit stop");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        let tasks = self.tasks();
        let mut handles = self.handles.lock();
        handles.push(watcher);
        for task in tasks {
            handles.push(tokio::spawn(task.run(self.cancel.child_token())));
        }

        info!(tasks = handles.len() - 1, "Service-center task started");
    }

    /// Stop every child task
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every spawned task to finish
    pub async fn join(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        join_all(handles).await;
    }
}

impl Drop for ServiceCenterTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalServiceCenter;
    use crate::config::MicroserviceDefinition;
    use crate::registry::microservice::Microservice;
    use crate::task::RegisterTiming;
    use std::time::Duration;

    fn register_task(
        name: &str,
        center: &Arc<LocalServiceCenter>,
        bus: &EventBus,
    ) -> Arc<MicroserviceRegisterTask> {
        let ms = Arc::new(Microservice::from_definition(&MicroserviceDefinition::new(
            "app", name,
        )));
        Arc::new(MicroserviceRegisterTask::new(
            ms,
            center.clone(),
            bus.clone(),
            RegisterTiming {
                heartbeat_interval: Duration::from_millis(20),
                retry_initial_interval: Duration::from_millis(5),
                retry_max_interval: Duration::from_millis(20),
            },
        ))
    }

    #[tokio::test]
    async fn test_init_registers_all_children() {
        let center = Arc::new(LocalServiceCenter::new());
        let bus = EventBus::new(64);
        let root = ServiceCenterTask::new(bus.clone());
        root.add_microservice_task(register_task("svcA", &center, &bus));
        root.add_microservice_task(register_task("svcB", &center, &bus));

        root.init();
        assert!(root.is_started());

        tokio::time::timeout(Duration::from_secs(5), async {
            while center.instance_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(center.service_count(), 2);
        root.stop();
        tokio::time::timeout(Duration::from_secs(1), root.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_event_stops_tasks() {
        let center = Arc::new(LocalServiceCenter::new());
        let bus = EventBus::new(64);
        let root = ServiceCenterTask::new(bus.clone());
        root.add_microservice_task(register_task("svcA", &center, &bus));
        root.init();

        bus.post(RegistryEvent::Shutdown);
        tokio::time::timeout(Duration::from_secs(1), root.join())
            .await
            .unwrap();
        assert!(root.is_stopped());
    }

    #[tokio::test]
    async fn test_add_after_start_is_ignored() {
        let center = Arc::new(LocalServiceCenter::new());
        let bus = EventBus::new(64);
        let root = ServiceCenterTask::new(bus.clone());
        root.init();

        root.add_microservice_task(register_task("late", &center, &bus));
        assert_eq!(root.task_count(), 0);
        root.stop();
    }
}
