//! Standalone Service Center
//!
//! An in-process service center used when no remote one is configured, and
//! by tests. Registrations live in memory; availability can be switched off
//! to simulate a lost connection, in which case every call fails the way a
//! remote client reports failures.

use crate::config::ServiceRegistryConfig;
use crate::domain::ports::{
    EndpointSelectorRef, HeartbeatStatus, InstanceRecord, Properties, RegistryClient,
    RegistryClientRef, ServiceRecord, VERSION_RULE_ALL,
};
use crate::error::Result;
use crate::registry::ComponentFactory;
use async_trait::async_trait;
use parking_lot::RwLock;
use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Registration State
// =============================================================================

#[derive(Debug, Clone)]
struct ServiceState {
    record: ServiceRecord,
    registered_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
struct InstanceState {
    record: InstanceRecord,
    last_heartbeat: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
struct Registrations {
    /// Services by id, in registration order of ids
    services: BTreeMap<String, ServiceState>,
    /// Instances in registration order
    instances: Vec<InstanceState>,
}

// =============================================================================
// Local Service Center
// =============================================================================

/// In-memory service center
#[derive(Debug)]
pub struct LocalServiceCenter {
    state: RwLock<Registrations>,
    available: AtomicBool,
    next_id: AtomicU64,
}

impl LocalServiceCenter {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Registrations::default()),
            available: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Simulate losing or regaining the connection
    pub fn set_available(&self, available: bool) {
        let previous = self.available.swap(available, Ordering::SeqCst);
        if previous != available {
            info!(available = available, "Standalone service center availability changed");
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn service_count(&self) -> usize {
        self.state.read().services.len()
    }

    pub fn instance_count(&self) -> usize {
        self.state.read().instances.len()
    }

    /// Registered instances of a service
    pub fn instances_of(&self, service_id: &str) -> Vec<InstanceRecord> {
        self.state
            .read()
            .instances
            .iter()
            .filter(|i| i.record.service_id == service_id)
            .map(|i| i.record.clone())
            .collect()
    }

    /// Drop an instance as if its lease had expired
    pub fn expire_instance(&self, instance_id: &str) -> bool {
        let mut state = self.state.write();
        let before = state.instances.len();
        state.instances.retain(|i| i.record.instance_id != instance_id);
        before != state.instances.len()
    }

    /// Seconds since the last heartbeat of an instance
    pub fn heartbeat_age(&self, instance_id: &str) -> Option<i64> {
        self.state
            .read()
            .instances
            .iter()
            .find(|i| i.record.instance_id == instance_id)
            .map(|i| (chrono::Utc::now() - i.last_heartbeat).num_seconds())
    }

    fn generate_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn check_available(&self, operation: &str) -> bool {
        let available = self.is_available();
        if !available {
            debug!(operation = operation, "Standalone service center unavailable");
        }
        available
    }
}

impl Default for LocalServiceCenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryClient for LocalServiceCenter {
    async fn register_microservice(&self, service: &ServiceRecord) -> Option<String> {
        if !self.check_available("register_microservice") {
            return None;
        }

        let mut state = self.state.write();
        if let Some(existing) = state.services.values().find(|s| {
            s.record.app_id == service.app_id
                && s.record.service_name == service.service_name
                && s.record.version == service.version
        }) {
            return Some(existing.record.service_id.clone());
        }

        let service_id = self.generate_id("svc");
        let mut record = service.clone();
        record.service_id = service_id.clone();
        state.services.insert(
            service_id.clone(),
            ServiceState {
                record,
                registered_at: chrono::Utc::now(),
            },
        );

        info!(
            "Registered microservice {}/{}@{} as {}",
            service.app_id, service.service_name, service.version, service_id
        );
        Some(service_id)
    }

    async fn register_instance(&self, instance: &InstanceRecord) -> Option<String> {
        if !self.check_available("register_instance") {
            return None;
        }

        let mut state = self.state.write();
        if !state.services.contains_key(&instance.service_id) {
            warn!(service_id = %instance.service_id, "Instance registration for unknown service");
            return None;
        }

        if !instance.instance_id.is_empty() {
            if let Some(existing) = state
                .instances
                .iter_mut()
                .find(|i| i.record.instance_id == instance.instance_id)
            {
                existing.last_heartbeat = chrono::Utc::now();
                return Some(existing.record.instance_id.clone());
            }
        }

        let instance_id = self.generate_id("inst");
        let mut record = instance.clone();
        record.instance_id = instance_id.clone();
        state.instances.push(InstanceState {
            record,
            last_heartbeat: chrono::Utc::now(),
        });

        info!(
            "Registered instance {} of service {}",
            instance_id, instance.service_id
        );
        Some(instance_id)
    }

    async fn heartbeat(&self, service_id: &str, instance_id: &str) -> HeartbeatStatus {
        if !self.check_available("heartbeat") {
            return HeartbeatStatus::Failed;
        }

        let mut state = self.state.write();
        match state
            .instances
            .iter_mut()
            .find(|i| i.record.service_id == service_id && i.record.instance_id == instance_id)
        {
            Some(instance) => {
                instance.last_heartbeat = chrono::Utc::now();
                HeartbeatStatus::Ok
            }
            None => HeartbeatStatus::InstanceMissing,
        }
    }

    async fn unregister_instance(&self, service_id: &str, instance_id: &str) -> bool {
        if !self.check_available("unregister_instance") {
            return false;
        }

        let mut state = self.state.write();
        let before = state.instances.len();
        state
            .instances
            .retain(|i| !(i.record.service_id == service_id && i.record.instance_id == instance_id));
        before != state.instances.len()
    }

    async fn find_service_instances(
        &self,
        consumer_id: &str,
        app_id: &str,
        service_name: &str,
        version_rule: &str,
    ) -> Option<Vec<InstanceRecord>> {
        if !self.check_available("find_service_instances") {
            return None;
        }

        let state = self.state.read();
        let candidates: Vec<&ServiceRecord> = state
            .services
            .values()
            .map(|s| &s.record)
            .filter(|r| r.app_id == app_id && r.service_name == service_name)
            .collect();

        let service_ids = select_versions(&candidates, version_rule);
        let instances: Vec<InstanceRecord> = state
            .instances
            .iter()
            .filter(|i| service_ids.contains(&i.record.service_id))
            .map(|i| i.record.clone())
            .collect();

        debug!(
            consumer = consumer_id,
            service = service_name,
            rule = version_rule,
            found = instances.len(),
            "Resolved service instances"
        );
        Some(instances)
    }

    async fn get_microservice(&self, service_id: &str) -> Option<ServiceRecord> {
        if !self.check_available("get_microservice") {
            return None;
        }
        self.state
            .read()
            .services
            .get(service_id)
            .map(|s| s.record.clone())
    }

    async fn update_microservice_properties(
        &self,
        service_id: &str,
        properties: &Properties,
    ) -> bool {
        if !self.check_available("update_microservice_properties") {
            return false;
        }

        match self.state.write().services.get_mut(service_id) {
            Some(service) => {
                service.record.properties = properties.clone();
                debug!(
                    service_id = service_id,
                    registered_at = %service.registered_at,
                    "Updated microservice properties"
                );
                true
            }
            None => false,
        }
    }

    async fn update_instance_properties(
        &self,
        service_id: &str,
        instance_id: &str,
        properties: &Properties,
    ) -> bool {
        if !self.check_available("update_instance_properties") {
            return false;
        }

        match self
            .state
            .write()
            .instances
            .iter_mut()
            .find(|i| i.record.service_id == service_id && i.record.instance_id == instance_id)
        {
            Some(instance) => {
                instance.record.properties = properties.clone();
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Version Rules
// =============================================================================

/// Service ids whose version satisfies `rule`:
/// `0+` or empty (all), `latest`, `x.y.z+` (at least), or an exact version.
///
/// Versions are compared as semver. Short forms such as `1.0` count as
/// `1.0.0`; a version that still does not parse only matches itself.
fn select_versions(candidates: &[&ServiceRecord], rule: &str) -> Vec<String> {
    let rule = rule.trim();
    let selected: Vec<&&ServiceRecord> = match rule {
        "" | VERSION_RULE_ALL => candidates.iter().collect(),
        "latest" => candidates
            .iter()
            .filter_map(|r| parse_version(&r.version).map(|v| (r, v)))
            // A release always wins over a pre-release
            .max_by_key(|(_, v)| (v.pre.is_empty(), v.clone()))
            .map(|(r, _)| r)
            .into_iter()
            .collect(),
        _ => match rule.strip_suffix('+') {
            Some(min) => match parse_version(min)
                .and_then(|min| VersionReq::parse(&format!(">={}", min)).ok())
            {
                Some(req) => candidates
                    .iter()
                    .filter(|r| parse_version(&r.version).is_some_and(|v| req.matches(&v)))
                    .collect(),
                None => candidates.iter().filter(|r| r.version == min).collect(),
            },
            None => {
                let wanted = parse_version(rule);
                candidates
                    .iter()
                    .filter(|r| match (&wanted, parse_version(&r.version)) {
                        (Some(wanted), Some(version)) => *wanted == version,
                        _ => r.version == rule,
                    })
                    .collect()
            }
        },
    };

    selected.into_iter().map(|r| r.service_id.clone()).collect()
}

/// Parse a version, padding a missing minor or patch with zeros
fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let split = raw.find(|c: char| c == '-' || c == '+').unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split);
    let padding = match core.matches('.').count() {
        0 => ".0.0",
        1 => ".0",
        _ => return None,
    };
    Version::parse(&format!("{}{}{}", core, padding, suffix)).ok()
}

// =============================================================================
// Factory
// =============================================================================

/// Component factory that hands out a shared standalone service center
#[derive(Debug, Clone)]
pub struct LocalClientFactory {
    center: Arc<LocalServiceCenter>,
}

impl LocalClientFactory {
    pub fn new(center: Arc<LocalServiceCenter>) -> Self {
        Self { center }
    }

    pub fn center(&self) -> &Arc<LocalServiceCenter> {
        &self.center
    }
}

impl ComponentFactory for LocalClientFactory {
    fn create_client(
        &self,
        _config: &ServiceRegistryConfig,
        _endpoints: EndpointSelectorRef,
    ) -> Result<RegistryClientRef> {
        Ok(self.center.clone())
    }
}
