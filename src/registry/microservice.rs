//! Local Microservices
//!
//! The in-process view of a configured microservice and its attached
//! instance. Remote identity fields stay empty until the registration task
//! assigns them. Property mappings are immutable snapshots: an update swaps
//! the whole `Arc`, so readers never see a partially applied mapping.

use crate::config::{InstanceDefinition, MicroserviceDefinition};
use crate::domain::ports::{BasePath, InstanceRecord, InstanceStatus, Properties, ServiceRecord};
use parking_lot::RwLock;
use std::sync::Arc;

// =============================================================================
// Instance Identity
// =============================================================================

#[derive(Debug, Clone, Default)]
struct InstanceIdentity {
    service_id: String,
    instance_id: String,
}

// =============================================================================
// Microservice Instance
// =============================================================================

/// The instance of a local microservice hosted by this process
#[derive(Debug)]
pub struct MicroserviceInstance {
    identity: RwLock<InstanceIdentity>,
    host_name: String,
    endpoints: Vec<String>,
    properties: RwLock<Arc<Properties>>,
}

impl MicroserviceInstance {
    pub(crate) fn from_definition(def: &InstanceDefinition) -> Self {
        let host_name = def
            .host_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            identity: RwLock::new(InstanceIdentity::default()),
            host_name,
            endpoints: def.endpoints.clone(),
            properties: RwLock::new(Arc::new(def.properties.clone())),
        }
    }

    /// Remote service id, empty until registered
    pub fn service_id(&self) -> String {
        self.identity.read().service_id.clone()
    }

    /// Remote instance id, empty until registered
    pub fn instance_id(&self) -> String {
        self.identity.read().instance_id.clone()
    }

    /// Both ids read together
    pub fn ids(&self) -> (String, String) {
        let identity = self.identity.read();
        (identity.service_id.clone(), identity.instance_id.clone())
    }

    pub fn is_registered(&self) -> bool {
        !self.identity.read().instance_id.is_empty()
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Current property snapshot
    pub fn properties(&self) -> Arc<Properties> {
        self.properties.read().clone()
    }

    pub(crate) fn replace_properties(&self, properties: Properties) {
        *self.properties.write() = Arc::new(properties);
    }

    pub(crate) fn assign_service_id(&self, service_id: &str) {
        self.identity.write().service_id = service_id.to_string();
    }

    pub(crate) fn assign_instance_id(&self, instance_id: &str) {
        self.identity.write().instance_id = instance_id.to_string();
    }

    /// Forget the instance id after the service center lost the instance
    pub(crate) fn clear_instance_id(&self) {
        self.identity.write().instance_id.clear();
    }

    /// Registration payload
    pub fn to_record(&self) -> InstanceRecord {
        let (service_id, instance_id) = self.ids();
        InstanceRecord {
            service_id,
            instance_id,
            host_name: self.host_name.clone(),
            endpoints: self.endpoints.clone(),
            properties: (*self.properties()).clone(),
            status: InstanceStatus::Up,
        }
    }
}

// =============================================================================
// Microservice
// =============================================================================

/// A microservice hosted by this process
#[derive(Debug)]
pub struct Microservice {
    app_id: String,
    service_name: String,
    version: String,
    service_id: RwLock<String>,
    paths: RwLock<Vec<BasePath>>,
    properties: RwLock<Arc<Properties>>,
    instance: Arc<MicroserviceInstance>,
}

impl Microservice {
    pub(crate) fn from_definition(def: &MicroserviceDefinition) -> Self {
        Self {
            app_id: def.app_id.clone(),
            service_name: def.name.clone(),
            version: def.version.clone(),
            service_id: RwLock::new(String::new()),
            paths: RwLock::new(def.paths.clone()),
            properties: RwLock::new(Arc::new(def.properties.clone())),
            instance: Arc::new(MicroserviceInstance::from_definition(&def.instance)),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `app_id/service_name`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.app_id, self.service_name)
    }

    /// Remote service id, empty until registered
    pub fn service_id(&self) -> String {
        self.service_id.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        !self.service_id.read().is_empty()
    }

    pub fn paths(&self) -> Vec<BasePath> {
        self.paths.read().clone()
    }

    /// Current property snapshot
    pub fn properties(&self) -> Arc<Properties> {
        self.properties.read().clone()
    }

    /// The instance attached to this microservice
    pub fn instance(&self) -> &Arc<MicroserviceInstance> {
        &self.instance
    }

    pub(crate) fn replace_properties(&self, properties: Properties) {
        *self.properties.write() = Arc::new(properties);
    }

    /// Record the remote id; the attached instance belongs to the same service
    pub(crate) fn assign_service_id(&self, service_id: &str) {
        *self.service_id.write() = service_id.to_string();
        self.instance.assign_service_id(service_id);
    }

    /// Set `key = value` on every path, creating missing property maps.
    /// Returns the number of paths touched.
    pub(crate) fn force_path_property(&self, key: &str, value: &str) -> usize {
        let mut paths = self.paths.write();
        for path in paths.iter_mut() {
            path.property
                .get_or_insert_with(Properties::new)
                .insert(key.to_string(), value.to_string());
        }
        paths.len()
    }

    /// Registration payload
    pub fn to_record(&self) -> ServiceRecord {
        ServiceRecord {
            service_id: self.service_id(),
            app_id: self.app_id.clone(),
            service_name: self.service_name.clone(),
            version: self.version.clone(),
            paths: self.paths(),
            properties: (*self.properties()).clone(),
        }
    }
}
