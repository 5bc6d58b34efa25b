//! YAML Configuration Loader
//!
//! Loads one or more microservice configuration files. Files are applied in
//! ascending `config_order` (file order breaks ties); a later file replaces
//! earlier definitions with the same `app_id/name` and earlier
//! `service_center` sections.

use super::{MicroserviceConfigSource, MicroserviceDefinition, ServiceRegistryConfig};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk layout of a configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    config_order: i32,
    service_center: Option<ServiceRegistryConfig>,
    microservices: Vec<MicroserviceDefinition>,
}

/// Loads microservice definitions from YAML files
#[derive(Debug, Clone)]
pub struct YamlConfigLoader {
    paths: Vec<PathBuf>,
}

impl YamlConfigLoader {
    pub fn new<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
        }
    }

    fn read_files(&self) -> Result<Vec<ConfigFile>> {
        if self.paths.is_empty() {
            return Err(Error::Configuration(
                "no microservice configuration files given".into(),
            ));
        }

        let mut files = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let raw = std::fs::read_to_string(path)?;
            let file: ConfigFile = serde_yaml::from_str(&raw)?;
            debug!(
                path = %path.display(),
                order = file.config_order,
                microservices = file.microservices.len(),
                "Read configuration file"
            );
            files.push(file);
        }

        // Stable: equal orders keep file order
        files.sort_by_key(|f| f.config_order);
        Ok(files)
    }

    /// Service-center settings from the highest-priority file that has them
    pub fn registry_config(&self) -> Result<ServiceRegistryConfig> {
        let config = self
            .read_files()?
            .into_iter()
            .filter_map(|f| f.service_center)
            .last()
            .unwrap_or_default();
        Ok(config)
    }
}

impl MicroserviceConfigSource for YamlConfigLoader {
    fn load(&self) -> Result<Vec<MicroserviceDefinition>> {
        let mut merged: Vec<MicroserviceDefinition> = Vec::new();

        for file in self.read_files()? {
            for def in file.microservices {
                match merged
                    .iter_mut()
                    .find(|d| d.qualified_name() == def.qualified_name())
                {
                    Some(existing) => *existing = def,
                    None => merged.push(def),
                }
            }
        }

        info!(
            files = self.paths.len(),
            microservices = merged.len(),
            "Loaded microservice configuration"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_single_file() {
        let file = write_yaml(
            r#"
service_center:
  addresses: ["http://sc-1:30100", "http://sc-2:30100"]
  heartbeat_interval_secs: 10
microservices:
  - app_id: shop
    name: orders
    version: 2.1.0
    paths:
      - path: /orders
    properties:
      owner: team-a
    instance:
      endpoints: ["rest://0.0.0.0:8080"]
"#,
        );

        let loader = YamlConfigLoader::new([file.path()]);
        let defs = loader.load().unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].qualified_name(), "shop/orders");
        assert_eq!(defs[0].version, "2.1.0");
        assert_eq!(defs[0].paths[0].path, "/orders");
        assert_eq!(defs[0].instance.endpoints, vec!["rest://0.0.0.0:8080"]);

        let config = loader.registry_config().unwrap();
        assert_eq!(config.addresses.len(), 2);
        assert_eq!(config.heartbeat_interval_secs, 10);
    }

    #[test]
    fn test_higher_order_overrides() {
        let high = write_yaml(
            r#"
config_order: 10
microservices:
  - app_id: shop
    name: orders
    version: 3.0.0
"#,
        );
        let low = write_yaml(
            r#"
config_order: 0
service_center:
  addresses: ["http://sc-low:30100"]
microservices:
  - app_id: shop
    name: orders
    version: 1.0.0
  - app_id: shop
    name: payments
"#,
        );

        // High-order file listed first still wins
        let loader = YamlConfigLoader::new([high.path(), low.path()]);
        let defs = loader.load().unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "orders");
        assert_eq!(defs[0].version, "3.0.0");
        assert_eq!(defs[1].name, "payments");

        let config = loader.registry_config().unwrap();
        assert_eq!(config.addresses, vec!["http://sc-low:30100"]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = YamlConfigLoader::new(["/nonexistent/microservice.yaml"]);
        assert!(matches!(loader.load(), Err(Error::Io(_))));
    }

    #[test]
    fn test_no_files_is_configuration_error() {
        let loader = YamlConfigLoader::new(Vec::<PathBuf>::new());
        assert!(matches!(loader.load(), Err(Error::Configuration(_))));
    }
}
