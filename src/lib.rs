//! Service Center Registry - Client-Side Registry Coordinator
//!
//! Registers the microservices hosted by this process with a remote service
//! center, mirrors remote instance data into local caches, and keeps those
//! mirrors consistent across connectivity loss.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                        ServiceRegistry (coordinator)                         │
//! │   init / run / destroy      find / update / unregister      event handlers   │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐  ┌─────────────────────┐  ┌─────────────────────┐  │
//! │  │ MicroserviceManager │  │ ConsistencyMachine  │  │   CascadeHandle     │  │
//! │  │ (local services)    │  │ AVAILABLE/DEGRADED  │  │ (invalidation task) │  │
//! │  └─────────────────────┘  └──────────┬──────────┘  └──────────┬──────────┘  │
//! │                                      │ Exception/Recovery     │             │
//! │                           ┌──────────┴──────────┐             │             │
//! │                           │      EventBus       │             │             │
//! │                           └──────────┬──────────┘             │             │
//! ├──────────────────────────────────────┼────────────────────────┼─────────────┤
//! │  ┌───────────────────────────────────┴──┐  ┌──────────────────┴──────────┐  │
//! │  │ ServiceCenterTask                    │  │ Instance cache              │  │
//! │  │   MicroserviceRegisterTask (each)    │  │ Endpoint selector           │  │
//! │  │   register, heartbeat, backoff       │  │ Instance-version cache      │  │
//! │  └───────────────────┬──────────────────┘  └─────────────────────────────┘  │
//! ├──────────────────────┼──────────────────────────────────────────────────────┤
//! │                RegistryClient (remote service center)                        │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Coordinator, microservice set, consistency state machine
//! - [`cache`]: Local mirrors of service-center data
//! - [`task`]: Registration and heartbeat tasks
//! - [`client`]: Registry client implementations
//! - [`config`]: Configuration types and loaders
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod registry;
pub mod task;

// Re-export commonly used types
pub use registry::{
    ComponentFactory, ComponentFactoryRef, ConsistencyState, EventBus, Microservice,
    MicroserviceInstance, MicroserviceManager, RegistryEvent, ServiceRegistry,
    ServiceRegistryBuilder,
};

pub use cache::{InstanceCacheManager, InstanceVersionCacheManager, ServiceCenterEndpoints};

pub use client::{LocalClientFactory, LocalServiceCenter};

pub use config::{
    InstanceDefinition, MicroserviceConfigSource, MicroserviceDefinition, ServiceRegistryConfig,
    StaticConfigSource, YamlConfigLoader,
};

pub use domain::ports::{
    BasePath, CacheManager, EndpointSelector, HeartbeatStatus, InstanceRecord, InstanceStatus,
    Properties, RegistryClient, ServiceKey, ServiceRecord,
};

pub use error::{Error, Result};

pub use task::{MicroserviceRegisterTask, ServiceCenterTask};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
