//! Service Registry Coordinator
//!
//! Top-level orchestrator of the registry client. Owns the lifecycle of the
//! collaborators and keeps the local mirrors consistent with the service
//! center:
//!
//! - `init` builds the caches, the endpoint selector, the remote client and
//!   the registration task tree, then subscribes to the event bus
//! - `run` normalizes routes once and starts registration in the background
//! - `Exception`/`Recovery` events drive the consistency state machine; each
//!   DEGRADED -> AVAILABLE edge invalidates every mirror
//! - find/update/unregister call the service center and commit locally only
//!   on confirmed success
//! - `destroy` posts `Shutdown`, waits for the registration tasks to stop,
//!   and then unregisters every local instance

use crate::config::{
    MicroserviceConfigSource, MicroserviceDefinition, ServiceRegistryConfig, StaticConfigSource,
};
use crate::domain::ports::{
    CacheManagerRef, EndpointSelectorRef, InstanceRecord, Properties, RegistryClientRef,
    ServiceRecord, PATH_CHECKSESSION,
};
use crate::error::{Error, Result};
use crate::registry::consistency::{
    CacheCollaborators, CascadeHandle, ConsistencyMachine, ConsistencyState,
};
use crate::registry::events::{EventBus, RegistryEvent};
use crate::registry::factory::ComponentFactoryRef;
use crate::registry::manager::MicroserviceManager;
use crate::registry::microservice::{Microservice, MicroserviceInstance};
use crate::task::{MicroserviceRegisterTask, RegisterTiming, ServiceCenterTask};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`ServiceRegistry`]
pub struct ServiceRegistryBuilder {
    config: ServiceRegistryConfig,
    factory: ComponentFactoryRef,
    bus: Option<EventBus>,
    source: Option<Box<dyn MicroserviceConfigSource>>,
    client: Option<RegistryClientRef>,
}

impl ServiceRegistryBuilder {
    /// Share an existing event bus instead of creating one
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Source of the local microservice definitions
    pub fn config_source(mut self, source: impl MicroserviceConfigSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Local microservice definitions supplied in code
    pub fn definitions(self, definitions: Vec<MicroserviceDefinition>) -> Self {
        self.config_source(StaticConfigSource::new(definitions))
    }

    /// Use a ready client; the factory will not be asked for one
    pub fn client(mut self, client: RegistryClientRef) -> Self {
        self.client = Some(client);
        self
    }

    /// Load the local microservice set and build the coordinator
    pub fn build(self) -> Result<Arc<ServiceRegistry>> {
        let manager = match &self.source {
            Some(source) => {
                MicroserviceManager::load(source.as_ref(), self.config.default_microservice.clone())?
            }
            None => MicroserviceManager::from_definitions(
                Vec::new(),
                self.config.default_microservice.clone(),
            )?,
        };

        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.event_channel_capacity));

        let client = OnceLock::new();
        if let Some(injected) = self.client {
            let _ = client.set(injected);
        }

        Ok(Arc::new(ServiceRegistry {
            config: self.config,
            bus,
            manager,
            factory: self.factory,
            client,
            components: OnceLock::new(),
            consistency: ConsistencyMachine::new(),
            initializing: AtomicBool::new(false),
            running: AtomicBool::new(false),
            listener: Mutex::new(None),
        }))
    }
}

// =============================================================================
// Service Registry
// =============================================================================

/// Collaborators built by `init`
struct Components {
    caches: CacheCollaborators,
    cascade: CascadeHandle,
    task: ServiceCenterTask,
}

/// Client-side registry coordinator
pub struct ServiceRegistry {
    config: ServiceRegistryConfig,
    bus: EventBus,
    manager: MicroserviceManager,
    factory: ComponentFactoryRef,
    client: OnceLock<RegistryClientRef>,
    components: OnceLock<Components>,
    consistency: ConsistencyMachine,
    initializing: AtomicBool,
    running: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    pub fn builder(config: ServiceRegistryConfig, factory: ComponentFactoryRef) -> ServiceRegistryBuilder {
        ServiceRegistryBuilder {
            config,
            factory,
            bus: None,
            source: None,
            client: None,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build the collaborators and subscribe to the event bus
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        if self.initializing.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }

        match self.build_components() {
            Ok(components) => {
                if self.components.set(components).is_err() {
                    return Err(Error::AlreadyInitialized);
                }
            }
            Err(e) => {
                self.initializing.store(false, Ordering::Release);
                return Err(e);
            }
        }

        self.subscribe();

        info!(
            microservices = self.manager.len(),
            "Service registry initialized"
        );
        Ok(())
    }

    fn build_components(&self) -> Result<Components> {
        let instance_cache = self.factory.create_instance_cache(&self.config);
        let endpoint_selector = self
            .factory
            .create_endpoint_selector(&self.config, instance_cache.clone());
        let instance_version_cache = self.factory.create_instance_version_cache(&self.config);

        let client = match self.client.get() {
            Some(client) => client.clone(),
            None => {
                let client = self
                    .factory
                    .create_client(&self.config, endpoint_selector.clone())?;
                let _ = self.client.set(client.clone());
                client
            }
        };

        let caches = CacheCollaborators {
            instance_cache,
            endpoint_selector,
            instance_version_cache,
        };
        let cascade = CascadeHandle::spawn(caches.clone());

        let task = ServiceCenterTask::new(self.bus.clone());
        let timing = RegisterTiming::from(&self.config);
        for ms in self.manager.microservices() {
            task.add_microservice_task(Arc::new(MicroserviceRegisterTask::new(
                ms.clone(),
                client.clone(),
                self.bus.clone(),
                timing,
            )));
        }

        Ok(Components {
            caches,
            cascade,
            task,
        })
    }

    /// Start the listener that feeds bus events into the handlers. The
    /// listener holds a weak reference and exits once the registry is gone.
    fn subscribe(self: &Arc<Self>) {
        let mut events = self.bus.subscribe();
        let registry: Weak<Self> = Arc::downgrade(self);

        let listener = tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(this) = registry.upgrade() else {
                    break;
                };
                match received {
                    Ok(event) => this.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed signals may hide a reconnect; resync unconditionally
                        warn!(skipped = skipped, "Registry listener lagged, invalidating caches");
                        if let Some(components) = this.components.get() {
                            components.cascade.dispatch();
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Registry listener stopped");
        });

        *self.listener.lock() = Some(listener);
    }

    /// Normalize routes once and start registration in the background
    pub fn run(&self) -> Result<()> {
        let components = self.components.get().ok_or(Error::NotInitialized)?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        let normalized: usize = self
            .manager
            .microservices()
            .iter()
            .map(|ms| ms.force_path_property(PATH_CHECKSESSION, "false"))
            .sum();
        debug!(paths = normalized, "Disabled session checking on all paths");

        components.task.init();
        info!("Service registry running");
        Ok(())
    }

    /// Announce shutdown, stop the registration tasks, then unregister every
    /// local instance
    pub async fn destroy(&self) -> bool {
        info!("Destroying service registry");
        self.bus.post(RegistryEvent::Shutdown);

        // A heartbeat still in flight must settle before the unregister, or
        // it may find the instance gone and register it again
        if let Some(components) = self.components.get() {
            components.task.stop();
            components.task.join().await;
            debug!("Registration tasks stopped");
        }

        self.unregister_all_instances().await
    }

    pub fn is_initialized(&self) -> bool {
        self.components.get().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // =========================================================================
    // Consistency Handlers
    // =========================================================================

    /// Dispatch a bus event to its handler
    pub fn handle_event(&self, event: &RegistryEvent) {
        match event {
            RegistryEvent::Exception { .. } => self.on_exception(event),
            RegistryEvent::Recovery { .. } => self.on_recovered(event),
            other => debug!(event = other.kind(), "Registry event ignored"),
        }
    }

    /// Mark the mirrors as possibly stale
    pub fn on_exception(&self, event: &RegistryEvent) {
        if self.consistency.degrade() {
            warn!(
                event = ?event,
                "Lost connection to service center, mirrored data may be stale"
            );
        }
    }

    /// Leave the degraded state; the caller winning the transition queues
    /// the invalidation cascade
    pub fn on_recovered(&self, event: &RegistryEvent) {
        if !self.consistency.recover() {
            return;
        }
        debug!(event = ?event, "Service center connection recovered");
        match self.components.get() {
            Some(components) => components.cascade.dispatch(),
            None => warn!("Recovered before init, no caches to invalidate"),
        }
    }

    pub fn consistency_state(&self) -> ConsistencyState {
        self.consistency.state()
    }

    /// Cascades dispatched since init
    pub fn cascade_count(&self) -> u64 {
        self.components
            .get()
            .map(|c| c.cascade.dispatched())
            .unwrap_or(0)
    }

    /// Wait until at least `count` cascades have completed
    pub async fn wait_for_cascades(&self, count: u64) {
        if let Some(components) = self.components.get() {
            components.cascade.wait_for(count).await;
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Find instances of another service on behalf of the default
    /// microservice. Remote failures and empty results both yield an empty
    /// list; remote order is kept.
    pub async fn find_service_instance(
        &self,
        app_id: &str,
        service_name: &str,
        version_rule: &str,
    ) -> Result<Vec<InstanceRecord>> {
        let consumer = self
            .manager
            .default_microservice_force()
            .ok_or(Error::NoDefaultMicroservice)?;
        let client = self.require_client()?;

        match client
            .find_service_instances(&consumer.service_id(), app_id, service_name, version_rule)
            .await
        {
            Some(instances) => {
                if instances.is_empty() {
                    debug!(
                        "No instances of {}/{}@{}",
                        app_id, service_name, version_rule
                    );
                }
                Ok(instances)
            }
            None => {
                error!(
                    "Failed to find instances of {}/{}@{}",
                    app_id, service_name, version_rule
                );
                Ok(Vec::new())
            }
        }
    }

    /// Fetch a microservice record from the service center
    pub async fn get_remote_microservice(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        let client = self.require_client()?;
        let record = client.get_microservice(service_id).await;
        if record.is_none() {
            warn!(service_id = service_id, "Remote microservice not available");
        }
        Ok(record)
    }

    // =========================================================================
    // Property Updates
    // =========================================================================

    /// Update the properties of the default microservice
    pub async fn update_microservice_properties(&self, properties: Properties) -> Result<bool> {
        let ms = self
            .manager
            .default_microservice()
            .ok_or(Error::NoDefaultMicroservice)?;
        self.update_microservice_properties_for(&ms, properties).await
    }

    /// Update the properties of the named microservice
    pub async fn update_microservice_properties_of(
        &self,
        name: &str,
        properties: Properties,
    ) -> Result<bool> {
        let ms = self.manager.find_by_name(name)?;
        self.update_microservice_properties_for(&ms, properties).await
    }

    /// Update the properties of `microservice`. The local snapshot is
    /// replaced only when the service center accepted the update.
    pub async fn update_microservice_properties_for(
        &self,
        microservice: &Microservice,
        properties: Properties,
    ) -> Result<bool> {
        let client = self.require_client()?;
        self.ensure_local(microservice)?;
        let service_id = microservice.service_id();

        if client
            .update_microservice_properties(&service_id, &properties)
            .await
        {
            microservice.replace_properties(properties);
            info!(
                service = microservice.service_name(),
                service_id = %service_id,
                "Updated microservice properties"
            );
            Ok(true)
        } else {
            error!(
                service = microservice.service_name(),
                service_id = %service_id,
                "Failed to update microservice properties"
            );
            Ok(false)
        }
    }

    /// Update the properties of the default microservice's instance
    pub async fn update_instance_properties(&self, properties: Properties) -> Result<bool> {
        let ms = self
            .manager
            .default_microservice()
            .ok_or(Error::NoDefaultMicroservice)?;
        self.update_instance_properties_for(&ms, properties).await
    }

    /// Update the properties of the named microservice's instance
    pub async fn update_instance_properties_of(
        &self,
        name: &str,
        properties: Properties,
    ) -> Result<bool> {
        let ms = self.manager.find_by_name(name)?;
        self.update_instance_properties_for(&ms, properties).await
    }

    /// Update the properties of `microservice`'s instance, committing the
    /// local snapshot only on remote success
    pub async fn update_instance_properties_for(
        &self,
        microservice: &Microservice,
        properties: Properties,
    ) -> Result<bool> {
        let client = self.require_client()?;
        self.ensure_local(microservice)?;
        let instance = microservice.instance();
        let (service_id, instance_id) = instance.ids();

        if client
            .update_instance_properties(&service_id, &instance_id, &properties)
            .await
        {
            instance.replace_properties(properties);
            info!(
                service = microservice.service_name(),
                instance_id = %instance_id,
                "Updated instance properties"
            );
            Ok(true)
        } else {
            error!(
                service = microservice.service_name(),
                instance_id = %instance_id,
                "Failed to update instance properties"
            );
            Ok(false)
        }
    }

    // =========================================================================
    // Unregistration
    // =========================================================================

    /// Unregister every local instance in load order, stopping at the first
    /// failure
    pub async fn unregister_all_instances(&self) -> bool {
        for ms in self.manager.microservices() {
            if !self.unregister_instance(ms.instance()).await {
                return false;
            }
        }
        true
    }

    /// Unregister one local instance
    pub async fn unregister_instance(&self, instance: &MicroserviceInstance) -> bool {
        let Ok(client) = self.require_client() else {
            warn!("Unregister requested before init");
            return false;
        };
        let (service_id, instance_id) = instance.ids();

        if client.unregister_instance(&service_id, &instance_id).await {
            info!(
                service_id = %service_id,
                instance_id = %instance_id,
                "Unregistered microservice instance"
            );
            true
        } else {
            error!(
                service_id = %service_id,
                instance_id = %instance_id,
                "Failed to unregister microservice instance"
            );
            false
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    fn require_client(&self) -> Result<&RegistryClientRef> {
        self.client.get().ok_or(Error::NotInitialized)
    }

    /// Only microservices of the local set may be updated
    fn ensure_local(&self, microservice: &Microservice) -> Result<()> {
        if self.manager.contains(microservice) {
            Ok(())
        } else {
            Err(Error::MicroserviceNotFound {
                name: microservice.service_name().to_string(),
            })
        }
    }

    /// The default microservice
    pub fn microservice(&self) -> Option<Arc<Microservice>> {
        self.manager.default_microservice()
    }

    /// The instance of the default microservice
    pub fn microservice_instance(&self) -> Option<Arc<MicroserviceInstance>> {
        self.manager.default_instance()
    }

    pub fn manager(&self) -> &MicroserviceManager {
        &self.manager
    }

    pub fn client(&self) -> Option<RegistryClientRef> {
        self.client.get().cloned()
    }

    pub fn instance_cache(&self) -> Option<CacheManagerRef> {
        self.components
            .get()
            .map(|c| c.caches.instance_cache.clone())
    }

    pub fn instance_version_cache(&self) -> Option<CacheManagerRef> {
        self.components
            .get()
            .map(|c| c.caches.instance_version_cache.clone())
    }

    pub fn endpoint_selector(&self) -> Option<EndpointSelectorRef> {
        self.components
            .get()
            .map(|c| c.caches.endpoint_selector.clone())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &ServiceRegistryConfig {
        &self.config
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}
