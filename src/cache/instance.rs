//! Instance Mirrors
//!
//! `DashMap`-backed mirrors of instance lists fetched from the service
//! center. Reads run concurrently with `clean_up`; a reader sees either the
//! old entry or a miss, never a half-cleared set.

use crate::domain::ports::{CacheManager, InstanceRecord, ServiceKey, VERSION_RULE_ALL};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Shared Mirror Storage
// =============================================================================

#[derive(Debug, Default)]
struct InstanceMirror {
    entries: DashMap<ServiceKey, Arc<Vec<InstanceRecord>>>,
    cleanups: AtomicU64,
}

impl InstanceMirror {
    fn get(&self, key: &ServiceKey) -> Option<Arc<Vec<InstanceRecord>>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: ServiceKey, instances: Vec<InstanceRecord>) {
        self.entries.insert(key, Arc::new(instances));
    }

    fn clean_up(&self, name: &str) {
        let removed = self.entries.len();
        self.entries.clear();
        self.cleanups.fetch_add(1, Ordering::Relaxed);
        debug!(cache = name, removed = removed, "Cleaned up instance mirror");
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn cleanups(&self) -> u64 {
        self.cleanups.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Instance Cache
// =============================================================================

/// Mirror of all instances of a service, regardless of version
#[derive(Debug, Default)]
pub struct InstanceCacheManager {
    mirror: InstanceMirror,
}

impl InstanceCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &ServiceKey) -> ServiceKey {
        ServiceKey::new(&key.app_id, &key.service_name, VERSION_RULE_ALL)
    }

    /// Number of times the mirror was cleaned up
    pub fn cleanups(&self) -> u64 {
        self.mirror.cleanups()
    }
}

impl CacheManager for InstanceCacheManager {
    fn name(&self) -> &str {
        "instance-cache"
    }

    fn get(&self, key: &ServiceKey) -> Option<Arc<Vec<InstanceRecord>>> {
        self.mirror.get(&Self::normalize(key))
    }

    fn put(&self, key: ServiceKey, instances: Vec<InstanceRecord>) {
        self.mirror.put(Self::normalize(&key), instances);
    }

    fn clean_up(&self) {
        self.mirror.clean_up(self.name());
    }

    fn len(&self) -> usize {
        self.mirror.len()
    }
}

// =============================================================================
// Instance Version Cache
// =============================================================================

/// Mirror of instances keyed by the exact version rule that selected them
#[derive(Debug, Default)]
pub struct InstanceVersionCacheManager {
    mirror: InstanceMirror,
}

impl InstanceVersionCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the mirror was cleaned up
    pub fn cleanups(&self) -> u64 {
        self.mirror.cleanups()
    }
}

impl CacheManager for InstanceVersionCacheManager {
    fn name(&self) -> &str {
        "instance-version-cache"
    }

    fn get(&self, key: &ServiceKey) -> Option<Arc<Vec<InstanceRecord>>> {
        self.mirror.get(key)
    }

    fn put(&self, key: ServiceKey, instances: Vec<InstanceRecord>) {
        self.mirror.put(key, instances);
    }

    fn clean_up(&self) {
        self.mirror.clean_up(self.name());
    }

    fn len(&self) -> usize {
        self.mirror.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str) -> InstanceRecord {
        InstanceRecord {
            service_id: "sid".into(),
            instance_id: id.into(),
            host_name: "host".into(),
            endpoints: vec![format!("rest://10.0.0.{}:8080", id.len())],
            properties: Default::default(),
            status: Default::default(),
        }
    }

    #[test]
    fn test_instance_cache_ignores_version_rule() {
        let cache = InstanceCacheManager::new();
        cache.put(ServiceKey::new("app", "svc", "1.0.0+"), vec![instance("a")]);

        let hit = cache.get(&ServiceKey::new("app", "svc", "2.0.0")).unwrap();
        assert_eq!(hit[0].instance_id, "a");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_version_cache_keys_by_rule() {
        let cache = InstanceVersionCacheManager::new();
        cache.put(ServiceKey::new("app", "svc", "1.0.0+"), vec![instance("a")]);
        cache.put(ServiceKey::new("app", "svc", "latest"), vec![instance("b")]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&ServiceKey::new("app", "svc", "latest")).unwrap()[0].instance_id, "b");
        assert!(cache.get(&ServiceKey::new("app", "svc", "0+")).is_none());
    }

    #[test]
    fn test_clean_up_drops_everything() {
        let cache = InstanceVersionCacheManager::new();
        cache.put(ServiceKey::new("app", "a", "0+"), vec![instance("a")]);
        cache.put(ServiceKey::new("app", "b", "0+"), vec![instance("b")]);

        cache.clean_up();
        assert!(cache.is_empty());
        assert_eq!(cache.cleanups(), 1);
    }

    #[test]
    fn test_reader_keeps_snapshot_across_clean_up() {
        let cache = InstanceCacheManager::new();
        let key = ServiceKey::new("app", "svc", "0+");
        cache.put(key.clone(), vec![instance("a"), instance("b")]);

        let snapshot = cache.get(&key).unwrap();
        cache.clean_up();

        assert_eq!(snapshot.len(), 2);
        assert!(cache.get(&key).is_none());
    }
}
