//! Local Microservice Set
//!
//! Holds the microservices configured for this process, in load order, and
//! decides which one is the default.
//!
//! With a single configured microservice the default is unambiguous. With
//! several, [`MicroserviceManager::default_microservice`] only answers when
//! the configuration names one; [`MicroserviceManager::default_microservice_force`]
//! falls back to the first one loaded.

use crate::config::{MicroserviceConfigSource, MicroserviceDefinition};
use crate::error::{Error, Result};
use crate::registry::microservice::{Microservice, MicroserviceInstance};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// The set of microservices hosted by this process
#[derive(Debug, Default)]
pub struct MicroserviceManager {
    microservices: Vec<Arc<Microservice>>,
    default_name: Option<String>,
}

impl MicroserviceManager {
    /// Build the set from a configuration source
    pub fn load(source: &dyn MicroserviceConfigSource, default_name: Option<String>) -> Result<Self> {
        Self::from_definitions(source.load()?, default_name)
    }

    pub fn from_definitions(
        definitions: Vec<MicroserviceDefinition>,
        default_name: Option<String>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for def in &definitions {
            if !seen.insert(def.qualified_name()) {
                return Err(Error::DuplicateMicroservice {
                    app_id: def.app_id.clone(),
                    name: def.name.clone(),
                });
            }
        }

        if let Some(name) = &default_name {
            if !definitions.iter().any(|d| &d.name == name) {
                return Err(Error::Configuration(format!(
                    "default microservice {} is not configured",
                    name
                )));
            }
        }

        if definitions.len() > 1 && default_name.is_none() {
            warn!(
                count = definitions.len(),
                "Multiple microservices configured without a designated default"
            );
        }

        let microservices: Vec<_> = definitions
            .iter()
            .map(|def| Arc::new(Microservice::from_definition(def)))
            .collect();

        info!(count = microservices.len(), "Loaded local microservices");

        Ok(Self {
            microservices,
            default_name,
        })
    }

    /// All local microservices in load order
    pub fn microservices(&self) -> &[Arc<Microservice>] {
        &self.microservices
    }

    pub fn len(&self) -> usize {
        self.microservices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.microservices.is_empty()
    }

    /// The designated microservice, or the only one when exactly one is
    /// configured
    pub fn default_microservice(&self) -> Option<Arc<Microservice>> {
        if let Some(name) = &self.default_name {
            return self.find(name);
        }
        match self.microservices.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }

    /// Like [`Self::default_microservice`] but picks the first loaded
    /// microservice when no default can be determined. `None` only when
    /// nothing is configured.
    pub fn default_microservice_force(&self) -> Option<Arc<Microservice>> {
        self.default_microservice()
            .or_else(|| self.microservices.first().cloned())
    }

    /// Find by service name, `None` when not configured
    pub fn find(&self, name: &str) -> Option<Arc<Microservice>> {
        self.microservices
            .iter()
            .find(|ms| ms.service_name() == name)
            .cloned()
    }

    /// Find by service name; unknown names are a caller error
    pub fn find_by_name(&self, name: &str) -> Result<Arc<Microservice>> {
        self.find(name).ok_or_else(|| Error::MicroserviceNotFound {
            name: name.to_string(),
        })
    }

    /// Whether `microservice` is one of this set, by identity
    pub fn contains(&self, microservice: &Microservice) -> bool {
        self.microservices
            .iter()
            .any(|ms| std::ptr::eq(ms.as_ref(), microservice))
    }

    /// Instance attached to the default microservice
    pub fn default_instance(&self) -> Option<Arc<MicroserviceInstance>> {
        self.default_microservice().map(|ms| ms.instance().clone())
    }
}
