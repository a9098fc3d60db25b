// ============================================================================
// File: os-faults/src/loader.rs
// ----------------------------------------------------------------------------
// Top-level entry points: turn a configuration into a connected cloud.
//
// Every driver reference is resolved through the registry, its args
// validated against the driver schema, and the resulting parts wired into a
// CloudManagement: explicit discovery over the driver's own, power drivers
// in configuration order, catalogs merged over the built-ins.
// ============================================================================

use std::path::Path;

use log::{debug, info};

use crate::api::{CloudManagement, human};
use crate::config::{CloudConfig, DriverConf, resolve_config_path};
use crate::drivers::discover::node_list;
use crate::error::{OsFaultsError, Result};
use crate::registry::{DriverContext, Registry};

/// Connect to a cloud using the default driver context
///
/// # Arguments
/// * `config` - Parsed configuration document
///
/// # Returns
/// The wired CloudManagement; nothing is contacted yet
pub fn connect(config: &CloudConfig) -> Result<CloudManagement> {
    connect_with(config, &DriverContext::default())
}

/// Connect to a cloud with explicit external collaborators
///
/// # Arguments
/// * `config` - Parsed configuration document
/// * `ctx` - Executor factory, hypervisor connector and BMC client
pub fn connect_with(config: &CloudConfig, ctx: &DriverContext) -> Result<CloudManagement> {
    let registry = Registry::global()?;

    debug!("Cloud management driver: {}", config.cloud_management.driver);
    let parts = registry.build_cloud_management(&config.cloud_management, ctx)?;
    let mut builder = CloudManagement::builder(parts.driver).registry(registry.clone());

    let node_discover = match &config.node_discover {
        Some(conf) => Some(registry.build_node_discover(conf, ctx)?),
        None => parts.node_discover,
    };
    if let Some(discover) = node_discover {
        builder = builder.node_discover(discover);
    }

    for conf in config.power_drivers() {
        debug!("Power management driver: {}", conf.driver);
        builder = builder.power_driver(registry.build_power(conf, ctx)?);
    }

    let cloud = builder
        .services(config.services.clone())
        .containers(config.containers.clone())
        .build();
    info!("Connected to {} cloud", cloud.driver_name());
    Ok(cloud)
}

/// Load the configuration file and connect
///
/// # Arguments
/// * `path` - Explicit file; `$OS_FAULTS_CONFIG` and default paths otherwise
pub fn connect_from_file(path: Option<&Path>) -> Result<CloudManagement> {
    let path = resolve_config_path(path)?;
    connect(&CloudConfig::from_file(path)?)
}

/// Replace dynamic discovery with a static snapshot of the current nodes
///
/// # Returns
/// A copy of `config` whose `node_discover` is a `node_list` of the hosts
/// discovered right now
pub async fn discover(config: &CloudConfig) -> Result<CloudConfig> {
    discover_with(config, &DriverContext::default()).await
}

pub async fn discover_with(config: &CloudConfig, ctx: &DriverContext) -> Result<CloudConfig> {
    let cloud = connect_with(config, ctx)?;
    let nodes = cloud.get_nodes(None).await?;
    info!("Discovered {} node(s)", nodes.len());

    let hosts = serde_json::to_value(nodes.hosts())?;
    if hosts.as_array().is_none_or(Vec::is_empty) {
        return Err(OsFaultsError::discovery("Cloud has no nodes"));
    }

    let mut discovered = config.clone();
    discovered.node_discover = Some(DriverConf::new(node_list::NAME, hosts));
    Ok(discovered)
}

/// Run one human API command against `cloud`
pub async fn human_api(cloud: &CloudManagement, command: &str) -> Result<()> {
    info!("Executing command: {command}");
    human::execute(cloud, command).await
}
