//! Local Mirrors of Service-Center Data
//!
//! - **Instance cache**: instances per service, any version
//! - **Instance-version cache**: instances per service and version rule
//! - **Endpoint selector**: service-center addresses, configured or discovered
//!
//! All three are invalidated together, in that order, when connectivity to
//! the service center is restored after a failure.
//!
//! # Usage
//!
//! ```ignore
//! use service_center_registry::cache::get_or_load;
//! use service_center_registry::ServiceKey;
//!
//! let cache = registry.instance_version_cache().unwrap();
//! let key = ServiceKey::new("shop", "payments", "1.0.0+");
//! let instances = get_or_load(cache.as_ref(), key, async {
//!     registry.find_service_instance("shop", "payments", "1.0.0+").await.unwrap_or_default()
//! })
//! .await;
//! ```

pub mod endpoints;
pub mod instance;

pub use endpoints::ServiceCenterEndpoints;
pub use instance::{InstanceCacheManager, InstanceVersionCacheManager};

use crate::domain::ports::{CacheManager, InstanceRecord, ServiceKey};
use std::future::Future;
use std::sync::Arc;

/// Read-through lookup: return the mirrored set, or run `load` and mirror
/// its result. Empty results are returned but not mirrored.
pub async fn get_or_load<F>(
    cache: &dyn CacheManager,
    key: ServiceKey,
    load: F,
) -> Arc<Vec<InstanceRecord>>
where
    F: Future<Output = Vec<InstanceRecord>>,
{
    if let Some(hit) = cache.get(&key) {
        return hit;
    }

    let loaded = load.await;
    if loaded.is_empty() {
        return Arc::new(loaded);
    }

    cache.put(key.clone(), loaded);
    cache.get(&key).unwrap_or_default()
}
