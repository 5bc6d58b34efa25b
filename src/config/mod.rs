//! Registry Configuration
//!
//! Service-center connection settings and the definitions of the
//! microservices hosted by this process.

pub mod loader;

pub use loader::*;

use crate::domain::ports::{BasePath, Properties};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Service Registry Configuration
// =============================================================================

/// Settings for talking to the service center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRegistryConfig {
    /// Configured service-center addresses
    pub addresses: Vec<String>,
    /// Interval between instance heartbeats
    pub heartbeat_interval_secs: u64,
    /// First delay when registration has to be retried
    pub retry_initial_interval_ms: u64,
    /// Upper bound for the registration retry delay
    pub retry_max_interval_ms: u64,
    /// Capacity of the registry event bus
    pub event_channel_capacity: usize,
    /// Name of the microservice treated as the process default when more
    /// than one is configured
    pub default_microservice: Option<String>,
}

impl Default for ServiceRegistryConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["http://127.0.0.1:30100".to_string()],
            heartbeat_interval_secs: 30,
            retry_initial_interval_ms: 500,
            retry_max_interval_ms: 30_000,
            event_channel_capacity: 1024,
            default_microservice: None,
        }
    }
}

impl ServiceRegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn retry_initial_interval(&self) -> Duration {
        Duration::from_millis(self.retry_initial_interval_ms)
    }

    pub fn retry_max_interval(&self) -> Duration {
        Duration::from_millis(self.retry_max_interval_ms.max(self.retry_initial_interval_ms))
    }
}

// =============================================================================
// Microservice Definitions
// =============================================================================

/// Configured description of the local instance of a microservice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceDefinition {
    /// Endpoints the instance listens on (e.g., rest://0.0.0.0:8080)
    pub endpoints: Vec<String>,
    /// Host name reported to the service center
    pub host_name: Option<String>,
    /// Instance properties
    pub properties: Properties,
}

/// Configured description of a microservice hosted by this process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroserviceDefinition {
    /// Application id
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Service name
    pub name: String,
    /// Service version
    #[serde(default = "default_version")]
    pub version: String,
    /// Routes exposed by the service
    #[serde(default)]
    pub paths: Vec<BasePath>,
    /// Service properties
    #[serde(default)]
    pub properties: Properties,
    /// Local instance
    #[serde(default)]
    pub instance: InstanceDefinition,
}

fn default_app_id() -> String {
    "default".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl MicroserviceDefinition {
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            version: default_version(),
            paths: Vec::new(),
            properties: Properties::new(),
            instance: InstanceDefinition::default(),
        }
    }

    pub fn with_path(mut self, path: BasePath) -> Self {
        self.paths.push(path);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.instance.endpoints.push(endpoint.into());
        self
    }

    /// `app_id/name`, the identity used to detect duplicate definitions
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.app_id, self.name)
    }
}

// =============================================================================
// Configuration Source
// =============================================================================

/// Supplies the microservice definitions loaded at construction
pub trait MicroserviceConfigSource: Send + Sync {
    fn load(&self) -> Result<Vec<MicroserviceDefinition>>;
}

/// Definitions supplied in code
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    definitions: Vec<MicroserviceDefinition>,
}

impl StaticConfigSource {
    pub fn new(definitions: Vec<MicroserviceDefinition>) -> Self {
        Self { definitions }
    }
}

impl MicroserviceConfigSource for StaticConfigSource {
    fn load(&self) -> Result<Vec<MicroserviceDefinition>> {
        Ok(self.definitions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceRegistryConfig::default();
        assert_eq!(config.addresses.len(), 1);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert!(config.default_microservice.is_none());
    }

    #[test]
    fn test_retry_max_never_below_initial() {
        let config = ServiceRegistryConfig {
            retry_initial_interval_ms: 2_000,
            retry_max_interval_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.retry_max_interval(), Duration::from_millis(2_000));
    }

    #[test]
    fn test_definition_defaults_from_yaml() {
        let def: MicroserviceDefinition = serde_yaml::from_str("name: svcA\n").unwrap();
        assert_eq!(def.app_id, "default");
        assert_eq!(def.version, "1.0.0");
        assert!(def.paths.is_empty());
        assert_eq!(def.qualified_name(), "default/svcA");
    }
}
