//! Component Factory
//!
//! Builds the collaborators the coordinator composes during `init`. The
//! cache collaborators have working defaults; the remote client has none and
//! must be supplied by the integration.

use crate::cache::{InstanceCacheManager, InstanceVersionCacheManager, ServiceCenterEndpoints};
use crate::config::ServiceRegistryConfig;
use crate::domain::ports::{CacheManagerRef, EndpointSelectorRef, RegistryClientRef};
use crate::error::Result;
use std::sync::Arc;

/// Factory for the collaborators of a [`crate::registry::ServiceRegistry`]
pub trait ComponentFactory: Send + Sync {
    /// Mirror of instances per service
    fn create_instance_cache(&self, _config: &ServiceRegistryConfig) -> CacheManagerRef {
        Arc::new(InstanceCacheManager::new())
    }

    /// Service-center endpoint selector; reads discovered addresses from the
    /// instance cache
    fn create_endpoint_selector(
        &self,
        config: &ServiceRegistryConfig,
        instance_cache: CacheManagerRef,
    ) -> EndpointSelectorRef {
        Arc::new(ServiceCenterEndpoints::new(
            config.addresses.clone(),
            instance_cache,
        ))
    }

    /// Mirror of instances per service and version rule
    fn create_instance_version_cache(&self, _config: &ServiceRegistryConfig) -> CacheManagerRef {
        Arc::new(InstanceVersionCacheManager::new())
    }

    /// Remote service-center client
    fn create_client(
        &self,
        config: &ServiceRegistryConfig,
        endpoints: EndpointSelectorRef,
    ) -> Result<RegistryClientRef>;
}

pub type ComponentFactoryRef = Arc<dyn ComponentFactory>;
