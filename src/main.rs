//! Service Center Registry
//!
//! Registers the microservices described in the configuration files with a
//! service center, keeps their instances alive, and unregisters them on
//! Ctrl-C.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use service_center_registry::{
    ComponentFactoryRef, LocalClientFactory, LocalServiceCenter, ServiceRegistry,
    ServiceRegistryConfig, StaticConfigSource, YamlConfigLoader,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Service Center Registry - registers local microservices with a service center
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration files, applied in order
    #[arg(long = "config", env = "REGISTRY_CONFIG", value_delimiter = ',')]
    config: Vec<PathBuf>,

    /// Service-center addresses, overriding the configuration files
    #[arg(long = "address", env = "SERVICE_CENTER_ADDRESSES", value_delimiter = ',')]
    addresses: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run against an in-process service center
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Service Center Registry");
    info!("  Version: {}", service_center_registry::VERSION);
    info!("  Config files: {:?}", args.config);
    info!("  Standalone mode: {}", args.standalone);

    let factory: ComponentFactoryRef = if args.standalone {
        Arc::new(LocalClientFactory::new(Arc::new(LocalServiceCenter::new())))
    } else {
        bail!("no remote service-center client is available in this build, run with --standalone");
    };

    let builder = if args.config.is_empty() {
        warn!("No configuration files given, no microservices will be registered");
        let config = apply_overrides(ServiceRegistryConfig::default(), &args);
        ServiceRegistry::builder(config, factory).config_source(StaticConfigSource::default())
    } else {
        let loader = YamlConfigLoader::new(&args.config);
        let config = loader
            .registry_config()
            .context("failed to load service-center settings")?;
        let config = apply_overrides(config, &args);
        ServiceRegistry::builder(config, factory).config_source(loader)
    };

    let registry = builder.build().context("failed to load microservices")?;
    registry.init().await?;
    registry.run()?;

    info!(
        "Registry running with {} microservice(s), press Ctrl-C to stop",
        registry.manager().len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    if registry.destroy().await {
        info!("All instances unregistered");
    } else {
        warn!("Some instances could not be unregistered");
    }

    info!("Registry shutdown complete");
    Ok(())
}

fn apply_overrides(mut config: ServiceRegistryConfig, args: &Args) -> ServiceRegistryConfig {
    if !args.addresses.is_empty() {
        config.addresses = args.addresses.clone();
    }
    config
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
