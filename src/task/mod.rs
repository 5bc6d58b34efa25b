//! Registration Tasks
//!
//! Background work that registers the local microservices with the service
//! center and keeps their instances alive.

pub mod microservice;
pub mod service_center;

pub use microservice::{MicroserviceRegisterTask, RegisterTiming};
pub use service_center::ServiceCenterTask;

use crate::config::ServiceRegistryConfig;

impl From<&ServiceRegistryConfig> for RegisterTiming {
    fn from(config: &ServiceRegistryConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            retry_initial_interval: config.retry_initial_interval(),
            retry_max_interval: config.retry_max_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timing_from_config() {
        let config = ServiceRegistryConfig {
            heartbeat_interval_secs: 10,
            retry_initial_interval_ms: 200,
            retry_max_interval_ms: 5_000,
            ..Default::default()
        };
        let timing = RegisterTiming::from(&config);
        assert_eq!(timing.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(timing.retry_initial_interval, Duration::from_millis(200));
        assert_eq!(timing.retry_max_interval, Duration::from_secs(5));
    }
}
