//! Microservice Registration Task
//!
//! Drives one local microservice through registration and keeps its
//! instance alive:
//!
//! 1. Register the microservice (when it has no service id yet)
//! 2. Register its instance (when it has no instance id yet)
//! 3. Heartbeat on a fixed interval; register the instance again if the
//!    service center reports it missing
//!
//! Failed calls are retried with exponential backoff. Every failure posts an
//! `Exception` event; the first success after a failure posts `Recovery`.

use crate::domain::ports::{HeartbeatStatus, RegistryClientRef};
use crate::error::Error;
use crate::registry::events::{EventBus, RegistryEvent};
use crate::registry::microservice::Microservice;
use backoff::ExponentialBackoffBuilder;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Timing of a registration task
#[derive(Debug, Clone, Copy)]
pub struct RegisterTiming {
    pub heartbeat_interval: Duration,
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
}

impl Default for RegisterTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            retry_initial_interval: Duration::from_millis(500),
            retry_max_interval: Duration::from_secs(30),
        }
    }
}

/// Registration and heartbeat loop for one microservice
pub struct MicroserviceRegisterTask {
    microservice: Arc<Microservice>,
    client: RegistryClientRef,
    bus: EventBus,
    timing: RegisterTiming,
    /// Whether the last remote call succeeded
    healthy: AtomicBool,
    heartbeats: AtomicU64,
}

impl MicroserviceRegisterTask {
    pub fn new(
        microservice: Arc<Microservice>,
        client: RegistryClientRef,
        bus: EventBus,
        timing: RegisterTiming,
    ) -> Self {
        Self {
            microservice,
            client,
            bus,
            timing,
            healthy: AtomicBool::new(true),
            heartbeats: AtomicU64::new(0),
        }
    }

    pub fn microservice(&self) -> &Arc<Microservice> {
        &self.microservice
    }

    /// Successful heartbeats so far
    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Single Steps
    // =========================================================================

    /// Register whatever is not registered yet. Returns true once both the
    /// microservice and its instance carry remote ids.
    pub async fn register_once(&self) -> bool {
        let ms = &self.microservice;

        if !ms.is_registered() {
            match self.client.register_microservice(&ms.to_record()).await {
                Some(service_id) => {
                    ms.assign_service_id(&service_id);
                    info!(
                        service = ms.service_name(),
                        service_id = %service_id,
                        "Microservice registered"
                    );
                    self.bus.post(RegistryEvent::MicroserviceRegistered {
                        service_name: ms.service_name().to_string(),
                        service_id,
                    });
                }
                None => {
                    self.report_failure("register_microservice", ms.service_name());
                    return false;
                }
            }
        }

        let instance = ms.instance();
        if !instance.is_registered() {
            match self.client.register_instance(&instance.to_record()).await {
                Some(instance_id) => {
                    instance.assign_instance_id(&instance_id);
                    info!(
                        service = ms.service_name(),
                        instance_id = %instance_id,
                        "Microservice instance registered"
                    );
                    self.bus.post(RegistryEvent::InstanceRegistered {
                        service_id: ms.service_id(),
                        instance_id,
                    });
                }
                None => {
                    self.report_failure("register_instance", ms.service_name());
                    return false;
                }
            }
        }

        self.report_success("register");
        true
    }

    /// Send one heartbeat for the registered instance
    pub async fn heartbeat_once(&self) -> HeartbeatStatus {
        let instance = self.microservice.instance();
        let (service_id, instance_id) = instance.ids();

        let status = self.client.heartbeat(&service_id, &instance_id).await;
        match status {
            HeartbeatStatus::Ok => {
                self.heartbeats.fetch_add(1, Ordering::Relaxed);
                self.report_success("heartbeat");
            }
            HeartbeatStatus::InstanceMissing => {
                warn!(
                    service = self.microservice.service_name(),
                    instance_id = %instance_id,
                    "Service center lost the instance, registering again"
                );
                instance.clear_instance_id();
                // The service center answered; connectivity is fine
                self.report_success("heartbeat");
            }
            HeartbeatStatus::Failed => {
                self.report_failure("heartbeat", self.microservice.service_name());
            }
        }
        status
    }

    /// Register until it succeeds
    pub async fn register_with_retry(&self) {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.timing.retry_initial_interval)
            .with_max_interval(self.timing.retry_max_interval)
            .with_max_elapsed_time(None)
            .build();

        let service = self.microservice.service_name().to_string();
        let _ = backoff::future::retry_notify(
            policy,
            || {
                let reason = format!("{} is not registered yet", service);
                async move {
                    if self.register_once().await {
                        return Ok(());
                    }
                    let err = Error::RemoteCall {
                        operation: "register".to_string(),
                        reason,
                    };
                    if err.is_transient() {
                        Err(backoff::Error::transient(err))
                    } else {
                        Err(backoff::Error::permanent(err))
                    }
                }
            },
            |err: Error, delay: Duration| {
                debug!(
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying registration"
                );
            },
        )
        .await;
    }

    // =========================================================================
    // Main Loop
    // =========================================================================

    /// Register, then heartbeat until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let service = self.microservice.service_name().to_string();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(service = %service, "Registration cancelled");
                return;
            }
            _ = self.register_with_retry() => {}
        }

        let period = self.timing.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // The heartbeat itself is not interrupted; whoever stops the
                    // task waits for it before unregistering
                    if self.heartbeat_once().await == HeartbeatStatus::InstanceMissing {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = self.register_with_retry() => {}
                        }
                    }
                }
            }
        }

        debug!(service = %service, "Registration task stopped");
    }

    // =========================================================================
    // Connectivity Signals
    // =========================================================================

    fn report_failure(&self, operation: &str, service: &str) {
        self.healthy.store(false, Ordering::Release);
        warn!(
            operation = operation,
            service = service,
            "Service center call failed"
        );
        let error = Error::RemoteCall {
            operation: operation.to_string(),
            reason: format!("service center did not answer for {}", service),
        };
        self.bus
            .post(RegistryEvent::exception(operation, error.to_string()));
    }

    fn report_success(&self, operation: &str) {
        if !self.healthy.swap(true, Ordering::AcqRel) {
            info!(operation = operation, "Service center reachable again");
            self.bus.post(RegistryEvent::recovery(operation));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalServiceCenter;
    use crate::config::MicroserviceDefinition;
    use tokio::sync::broadcast;

    fn fast_timing() -> RegisterTiming {
        RegisterTiming {
            heartbeat_interval: Duration::from_millis(20),
            retry_initial_interval: Duration::from_millis(5),
            retry_max_interval: Duration::from_millis(20),
        }
    }

    fn setup() -> (Arc<LocalServiceCenter>, EventBus, Arc<MicroserviceRegisterTask>) {
        let center = Arc::new(LocalServiceCenter::new());
        let bus = EventBus::new(64);
        let ms = Arc::new(Microservice::from_definition(
            &MicroserviceDefinition::new("app", "svcA").with_endpoint("rest://127.0.0.1:8080"),
        ));
        let task = Arc::new(MicroserviceRegisterTask::new(
            ms,
            center.clone(),
            bus.clone(),
            fast_timing(),
        ));
        (center, bus, task)
    }

    fn drain(rx: &mut broadcast::Receiver<RegistryEvent>) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_register_once_assigns_identity() {
        let (center, bus, task) = setup();
        let mut rx = bus.subscribe();

        assert!(task.register_once().await);

        let ms = task.microservice();
        assert!(ms.is_registered());
        assert!(ms.instance().is_registered());
        assert_eq!(center.instances_of(&ms.service_id()).len(), 1);

        let kinds: Vec<_> = drain(&mut rx).iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["microservice_registered", "instance_registered"]);
    }

    #[tokio::test]
    async fn test_failure_then_recovery_events() {
        let (center, bus, task) = setup();
        let mut rx = bus.subscribe();

        center.set_available(false);
        assert!(!task.register_once().await);
        assert!(!task.register_once().await);
        assert!(!task.microservice().is_registered());

        center.set_available(true);
        assert!(task.register_once().await);

        let kinds: Vec<_> = drain(&mut rx).iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "exception",
                "exception",
                "microservice_registered",
                "instance_registered",
                "recovery"
            ]
        );
    }

    #[tokio::test]
    async fn test_heartbeat_missing_instance_clears_id() {
        let (center, _bus, task) = setup();
        assert!(task.register_once().await);

        let instance_id = task.microservice().instance().instance_id();
        assert_eq!(task.heartbeat_once().await, HeartbeatStatus::Ok);
        assert_eq!(task.heartbeat_count(), 1);

        center.expire_instance(&instance_id);
        assert_eq!(task.heartbeat_once().await, HeartbeatStatus::InstanceMissing);
        assert!(!task.microservice().instance().is_registered());

        assert!(task.register_once().await);
        assert_ne!(task.microservice().instance().instance_id(), instance_id);
    }

    #[tokio::test]
    async fn test_run_retries_until_available() {
        let (center, _bus, task) = setup();
        center.set_available(false);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(task.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.microservice().is_registered());

        center.set_available(true);
        tokio::time::timeout(Duration::from_secs(5), async {
            while task.heartbeat_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(task.microservice().instance().is_registered());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled_before_registration() {
        let (center, _bus, task) = setup();
        center.set_available(false);

        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task.clone().run(cancel))
            .await
            .unwrap();
        assert!(!task.microservice().is_registered());
    }
}
