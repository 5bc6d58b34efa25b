//! Domain Ports - Core trait definitions for the registry client
//!
//! These traits define the boundaries between the registry coordinator and
//! the systems it talks to: the remote service center, the local mirrors of
//! remote data, and the service-center endpoint selection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Property mapping attached to microservices, instances and paths
pub type Properties = BTreeMap<String, String>;

/// Path property that toggles session checking on a route
pub const PATH_CHECKSESSION: &str = "checksession";

/// Application id the service center registers itself under
pub const SERVICE_CENTER_APP_ID: &str = "default";

/// Service name the service center registers itself under
pub const SERVICE_CENTER_NAME: &str = "SERVICECENTER";

/// Version rule matching every version
pub const VERSION_RULE_ALL: &str = "0+";

// =============================================================================
// Route Definitions
// =============================================================================

/// A route exposed by a microservice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasePath {
    /// Route path (e.g., /orders)
    pub path: String,
    /// Route properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<Properties>,
}

impl BasePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            property: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.property
            .get_or_insert_with(Properties::new)
            .insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Remote Records
// =============================================================================

/// Microservice as seen by the service center
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Remote service id (empty when not yet assigned)
    #[serde(default)]
    pub service_id: String,
    pub app_id: String,
    pub service_name: String,
    pub version: String,
    #[serde(default)]
    pub paths: Vec<BasePath>,
    #[serde(default)]
    pub properties: Properties,
}

/// Instance lifecycle status as reported by the service center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    #[default]
    Up,
    Down,
    Starting,
    OutOfService,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Up => write!(f, "UP"),
            InstanceStatus::Down => write!(f, "DOWN"),
            InstanceStatus::Starting => write!(f, "STARTING"),
            InstanceStatus::OutOfService => write!(f, "OUTOFSERVICE"),
        }
    }
}

/// Instance as seen by the service center.
///
/// Records returned from lookups of other services are foreign and read-only;
/// they are never attached to a local microservice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub status: InstanceStatus,
}

/// Outcome of a heartbeat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    /// Heartbeat accepted
    Ok,
    /// Service center no longer knows the instance; it must register again
    InstanceMissing,
    /// Service center could not be reached
    Failed,
}

/// Key of a mirrored instance set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub app_id: String,
    pub service_name: String,
    pub version_rule: String,
}

impl ServiceKey {
    pub fn new(
        app_id: impl Into<String>,
        service_name: impl Into<String>,
        version_rule: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            service_name: service_name.into(),
            version_rule: version_rule.into(),
        }
    }

    /// Key of the service center's own instances
    pub fn service_center() -> Self {
        Self::new(SERVICE_CENTER_APP_ID, SERVICE_CENTER_NAME, VERSION_RULE_ALL)
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.app_id, self.service_name, self.version_rule)
    }
}

// =============================================================================
// Registry Client Port
// =============================================================================

/// Port for calls to the remote service center.
///
/// Implementations never raise past this boundary: failures are reported as
/// `None`, `false`, or [`HeartbeatStatus::Failed`].
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register a microservice, returning the assigned service id
    async fn register_microservice(&self, service: &ServiceRecord) -> Option<String>;

    /// Register an instance, returning the assigned instance id
    async fn register_instance(&self, instance: &InstanceRecord) -> Option<String>;

    /// Renew the lease of a registered instance
    async fn heartbeat(&self, service_id: &str, instance_id: &str) -> HeartbeatStatus;

    /// Remove a registered instance
    async fn unregister_instance(&self, service_id: &str, instance_id: &str) -> bool;

    /// Find instances of another service on behalf of `consumer_id`.
    ///
    /// `None` means the call failed; the coordinator does not distinguish it
    /// from an empty result.
    async fn find_service_instances(
        &self,
        consumer_id: &str,
        app_id: &str,
        service_name: &str,
        version_rule: &str,
    ) -> Option<Vec<InstanceRecord>>;

    /// Fetch a microservice by remote id
    async fn get_microservice(&self, service_id: &str) -> Option<ServiceRecord>;

    /// Replace the properties of a microservice
    async fn update_microservice_properties(&self, service_id: &str, properties: &Properties)
        -> bool;

    /// Replace the properties of an instance
    async fn update_instance_properties(
        &self,
        service_id: &str,
        instance_id: &str,
        properties: &Properties,
    ) -> bool;
}

// =============================================================================
// Cache Manager Port
// =============================================================================

/// Port for local mirrors of remote instance data
pub trait CacheManager: Send + Sync {
    /// Cache name, used in logs
    fn name(&self) -> &str;

    /// Look up a mirrored instance set
    fn get(&self, key: &ServiceKey) -> Option<Arc<Vec<InstanceRecord>>>;

    /// Store a mirrored instance set
    fn put(&self, key: ServiceKey, instances: Vec<InstanceRecord>);

    /// Drop every held entry
    fn clean_up(&self);

    /// Number of held entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Endpoint Selector Port
// =============================================================================

/// Port for choosing which service-center address to talk to
pub trait EndpointSelector: Send + Sync {
    /// Address to use for the next remote call
    fn next_endpoint(&self) -> Option<String>;

    /// Report that an address failed, moving on to the next one
    fn mark_failed(&self, endpoint: &str);

    /// Forget service-center addresses resolved from the instance cache
    fn clear_instance_cache(&self);
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type RegistryClientRef = Arc<dyn RegistryClient>;
pub type CacheManagerRef = Arc<dyn CacheManager>;
pub type EndpointSelectorRef = Arc<dyn EndpointSelector>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_path_with_property() {
        let path = BasePath::new("/orders").with_property(PATH_CHECKSESSION, "true");
        assert_eq!(
            path.property.as_ref().and_then(|p| p.get(PATH_CHECKSESSION)),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn test_service_key_display() {
        let key = ServiceKey::new("app", "svcA", "1.0.0+");
        assert_eq!(format!("{}", key), "app/svcA@1.0.0+");
        assert_eq!(format!("{}", ServiceKey::service_center()), "default/SERVICECENTER@0+");
    }

    #[test]
    fn test_instance_record_defaults_from_json() {
        let record: InstanceRecord =
            serde_json::from_str(r#"{"endpoints":["rest://10.0.0.1:8080"]}"#).unwrap();
        assert!(record.service_id.is_empty());
        assert!(record.instance_id.is_empty());
        assert_eq!(record.status, InstanceStatus::Up);
    }
}
