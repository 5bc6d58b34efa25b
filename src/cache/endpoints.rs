//! Service-Center Endpoints
//!
//! Chooses the service-center address for remote calls. Configured addresses
//! are the fallback; once the service center's own instances are mirrored in
//! the instance cache, their endpoints take over until the next
//! `clear_instance_cache`.

use crate::domain::ports::{CacheManagerRef, EndpointSelector, ServiceKey};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};
use url::Url;

/// Endpoint selector over configured and discovered service-center addresses
pub struct ServiceCenterEndpoints {
    configured: Vec<String>,
    instance_cache: CacheManagerRef,
    discovered: RwLock<Option<Vec<String>>>,
    cursor: AtomicUsize,
}

impl ServiceCenterEndpoints {
    pub fn new(configured: Vec<String>, instance_cache: CacheManagerRef) -> Self {
        Self {
            configured,
            instance_cache,
            discovered: RwLock::new(None),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Addresses currently in rotation
    pub fn addresses(&self) -> Vec<String> {
        if let Some(discovered) = self.discovered.read().as_ref() {
            return discovered.clone();
        }

        let resolved = self.resolve_from_cache();
        if resolved.is_empty() {
            return self.configured.clone();
        }

        debug!(count = resolved.len(), "Using service-center addresses from instance cache");
        *self.discovered.write() = Some(resolved.clone());
        resolved
    }

    fn resolve_from_cache(&self) -> Vec<String> {
        self.instance_cache
            .get(&ServiceKey::service_center())
            .map(|instances| {
                instances
                    .iter()
                    .flat_map(|i| i.endpoints.iter())
                    .filter_map(|endpoint| to_address(endpoint))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_using_discovered(&self) -> bool {
        self.discovered.read().is_some()
    }
}

impl EndpointSelector for ServiceCenterEndpoints {
    fn next_endpoint(&self) -> Option<String> {
        let addresses = self.addresses();
        if addresses.is_empty() {
            return None;
        }
        let index = self.cursor.load(Ordering::Relaxed) % addresses.len();
        Some(addresses[index].clone())
    }

    fn mark_failed(&self, endpoint: &str) {
        warn!(endpoint = endpoint, "Service-center endpoint failed, switching");
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }

    fn clear_instance_cache(&self) {
        *self.discovered.write() = None;
        self.cursor.store(0, Ordering::Relaxed);
        debug!("Cleared discovered service-center addresses");
    }
}

/// Convert a registered endpoint (`rest://host:port?sslEnabled=true`) into a
/// client address (`https://host:port`).
fn to_address(endpoint: &str) -> Option<String> {
    let url = Url::parse(endpoint).ok()?;
    if !matches!(url.scheme(), "rest" | "http" | "https") {
        return None;
    }

    let host = url.host_str().filter(|h| !h.is_empty())?;
    let tls = url.scheme() == "https"
        || url.query_pairs().any(|(key, value)| {
            key.eq_ignore_ascii_case("sslEnabled") && value.eq_ignore_ascii_case("true")
        });

    let scheme = if tls { "https" } else { "http" };
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InstanceCacheManager;
    use crate::domain::ports::{CacheManager, InstanceRecord};
    use std::sync::Arc;

    fn sc_instance(endpoints: &[&str]) -> InstanceRecord {
        InstanceRecord {
            service_id: "sc".into(),
            instance_id: "sc-1".into(),
            host_name: "sc".into(),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            properties: Default::default(),
            status: Default::default(),
        }
    }

    #[test]
    fn test_to_address() {
        assert_eq!(to_address("rest://10.0.0.1:30100").as_deref(), Some("http://10.0.0.1:30100"));
        assert_eq!(
            to_address("rest://10.0.0.1:30100?sslEnabled=true").as_deref(),
            Some("https://10.0.0.1:30100")
        );
        assert_eq!(
            to_address("rest://10.0.0.1:30100?timeout=5&sslEnabled=TRUE").as_deref(),
            Some("https://10.0.0.1:30100")
        );
        assert_eq!(
            to_address("rest://10.0.0.1:30100?sslEnabled=false").as_deref(),
            Some("http://10.0.0.1:30100")
        );
        assert_eq!(to_address("https://sc.local").as_deref(), Some("https://sc.local"));
        assert_eq!(to_address("rest://[::1]:30100").as_deref(), Some("http://[::1]:30100"));
        assert_eq!(to_address("highway://10.0.0.1:7070"), None);
        assert_eq!(to_address("not-an-endpoint"), None);
    }

    #[test]
    fn test_configured_addresses_rotate_on_failure() {
        let cache: CacheManagerRef = Arc::new(InstanceCacheManager::new());
        let selector = ServiceCenterEndpoints::new(
            vec!["http://sc-1:30100".into(), "http://sc-2:30100".into()],
            cache,
        );

        assert_eq!(selector.next_endpoint().as_deref(), Some("http://sc-1:30100"));
        selector.mark_failed("http://sc-1:30100");
        assert_eq!(selector.next_endpoint().as_deref(), Some("http://sc-2:30100"));
        selector.mark_failed("http://sc-2:30100");
        assert_eq!(selector.next_endpoint().as_deref(), Some("http://sc-1:30100"));
    }

    #[test]
    fn test_discovered_addresses_until_cleared() {
        let cache = Arc::new(InstanceCacheManager::new());
        let selector =
            ServiceCenterEndpoints::new(vec!["http://sc-config:30100".into()], cache.clone());

        cache.put(
            ServiceKey::service_center(),
            vec![sc_instance(&["rest://10.0.0.9:30100"])],
        );
        assert_eq!(selector.next_endpoint().as_deref(), Some("http://10.0.0.9:30100"));
        assert!(selector.is_using_discovered());

        // The mirror is gone; the selector keeps its resolved set until cleared
        cache.clean_up();
        assert!(selector.is_using_discovered());

        selector.clear_instance_cache();
        assert!(!selector.is_using_discovered());
        assert_eq!(selector.next_endpoint().as_deref(), Some("http://sc-config:30100"));
    }

    #[test]
    fn test_no_addresses() {
        let cache: CacheManagerRef = Arc::new(InstanceCacheManager::new());
        let selector = ServiceCenterEndpoints::new(Vec::new(), cache);
        assert_eq!(selector.next_endpoint(), None);
    }
}
