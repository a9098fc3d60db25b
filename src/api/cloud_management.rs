// ============================================================================
// File: os-faults/src/api/cloud_management.rs
// ----------------------------------------------------------------------------
// CloudManagement façade.
//
// A CloudManagement owns the cloud driver, the node discovery, the power
// manager and the merged service / container catalogs. It is a cheap handle
// over shared state: node collections and services keep a clone of it and
// two handles compare equal only when they point at the same instance.
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::api::{Container, Host, NodeCollection, NodeDiscover, PowerDriver, PowerManager, Service};
use crate::config::DriverConf;
use crate::error::{OsFaultsError, Result};
use crate::executor::{DEFAULT_ERROR_STATUSES, RemoteExecutor, Task, TaskRecord};
use crate::registry::Registry;

/// Driver behind a CloudManagement
///
/// Carries the static description of a deployment flavor: the executor used
/// to reach cloud nodes, the built-in service catalog, the networks that can
/// be toggled and the node collection kind it produces.
#[async_trait]
pub trait CloudManagementDriver: Send + Sync + fmt::Debug {
    /// Registered driver name
    fn name(&self) -> &'static str;

    /// Kind tag of the node collections this driver produces
    fn node_kind(&self) -> &'static str;

    /// Executor reaching the cloud nodes
    fn cloud_executor(&self) -> Arc<dyn RemoteExecutor>;

    /// Built-in service catalog
    fn services(&self) -> BTreeMap<String, DriverConf> {
        BTreeMap::new()
    }

    /// Built-in container catalog
    fn containers(&self) -> BTreeMap<String, DriverConf> {
        BTreeMap::new()
    }

    fn supported_networks(&self) -> &'static [&'static str] {
        &[]
    }

    /// Bring `network` up on every node of `nodes`
    async fn connect_network(&self, _nodes: &NodeCollection, _network: &str) -> Result<()> {
        Err(OsFaultsError::unsupported(self.name(), "connect"))
    }

    /// Take `network` down on every node of `nodes`
    async fn disconnect_network(&self, _nodes: &NodeCollection, _network: &str) -> Result<()> {
        Err(OsFaultsError::unsupported(self.name(), "disconnect"))
    }
}

struct CloudInner {
    driver: Arc<dyn CloudManagementDriver>,
    node_discover: Option<Arc<dyn NodeDiscover>>,
    power_manager: PowerManager,
    services: BTreeMap<String, DriverConf>,
    containers: BTreeMap<String, DriverConf>,
    registry: Option<Arc<Registry>>,
}

/// Handle to a connected cloud
#[derive(Clone)]
pub struct CloudManagement {
    inner: Arc<CloudInner>,
}

impl CloudManagement {
    /// Start building a CloudManagement around `driver`
    pub fn builder(driver: Arc<dyn CloudManagementDriver>) -> CloudManagementBuilder {
        CloudManagementBuilder::new(driver)
    }

    /// Whether both handles refer to the same instance
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn driver(&self) -> &Arc<dyn CloudManagementDriver> {
        &self.inner.driver
    }

    pub fn driver_name(&self) -> &'static str {
        self.inner.driver.name()
    }

    pub fn node_kind(&self) -> &'static str {
        self.inner.driver.node_kind()
    }

    pub fn power_manager(&self) -> &PowerManager {
        &self.inner.power_manager
    }

    pub fn node_discover(&self) -> Option<&Arc<dyn NodeDiscover>> {
        self.inner.node_discover.as_ref()
    }

    /// Check that the cloud is reachable
    ///
    /// Discovers nodes and runs `hostname` on all of them.
    pub async fn verify(&self) -> Result<()> {
        let nodes = self.get_nodes(None).await?;
        if nodes.is_empty() {
            return Err(OsFaultsError::discovery("Cloud has no nodes"));
        }
        debug!("Cloud nodes: {nodes:?}");

        let records = self
            .execute_on_cloud(&nodes.hosts(), &Task::command("hostname"), true)
            .await?;
        let names: Vec<&str> = records.iter().map(|r| r.payload.stdout.trim()).collect();
        info!("Connected to cloud successfully!");
        info!("Cloud nodes: {}", names.join(", "));
        Ok(())
    }

    /// Collection of all discovered nodes, optionally restricted to `fqdns`
    ///
    /// # Arguments
    /// * `fqdns` - Keep only hosts whose FQDN is listed; no match is an error
    pub async fn get_nodes(&self, fqdns: Option<&[String]>) -> Result<NodeCollection> {
        let discover = self.inner.node_discover.as_ref().ok_or_else(|| {
            OsFaultsError::config(format!(
                "Cloud management driver '{}' cannot discover nodes; configure node_discover",
                self.driver_name()
            ))
        })?;

        let hosts = discover.discover_hosts().await?;
        let nodes = NodeCollection::new(self, hosts);

        match fqdns {
            Some(fqdns) => nodes.filter(|host| {
                host.fqdn
                    .as_ref()
                    .is_some_and(|fqdn| fqdns.iter().any(|f| f == fqdn))
            }),
            None => Ok(nodes),
        }
    }

    /// Service instance for a catalog entry
    pub fn get_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        let conf = self.inner.services.get(name).ok_or_else(|| {
            OsFaultsError::service(format!(
                "{name} service is not supported by '{}' driver",
                self.driver_name()
            ))
        })?;
        self.registry()?.build_service(name, conf, self)
    }

    /// Container instance for a catalog entry
    pub fn get_container(&self, name: &str) -> Result<Arc<dyn Container>> {
        let conf = self.inner.containers.get(name).ok_or_else(|| {
            OsFaultsError::container(format!(
                "{name} container is not supported by '{}' driver",
                self.driver_name()
            ))
        })?;
        self.registry()?.build_container(name, conf, self)
    }

    /// Run a task on cloud hosts through the driver's executor
    ///
    /// # Arguments
    /// * `hosts` - Target hosts
    /// * `task` - Task to run
    /// * `raise_on_error` - When false, failing statuses are returned as records
    pub async fn execute_on_cloud(
        &self,
        hosts: &[Host],
        task: &Task,
        raise_on_error: bool,
    ) -> Result<Vec<TaskRecord>> {
        let statuses = if raise_on_error {
            DEFAULT_ERROR_STATUSES
        } else {
            &[]
        };
        self.inner
            .driver
            .cloud_executor()
            .execute(hosts, task, statuses)
            .await
    }

    pub fn list_supported_services(&self) -> Vec<String> {
        self.inner.services.keys().cloned().collect()
    }

    pub fn list_supported_containers(&self) -> Vec<String> {
        self.inner.containers.keys().cloned().collect()
    }

    pub fn list_supported_networks(&self) -> Vec<String> {
        self.inner
            .driver
            .supported_networks()
            .iter()
            .map(|n| (*n).to_string())
            .collect()
    }

    fn registry(&self) -> Result<Arc<Registry>> {
        match &self.inner.registry {
            Some(registry) => Ok(Arc::clone(registry)),
            None => Registry::global(),
        }
    }
}

impl fmt::Debug for CloudManagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudManagement")
            .field("driver", &self.driver_name())
            .field("power_drivers", &self.inner.power_manager.drivers().len())
            .field("services", &self.inner.services.len())
            .field("containers", &self.inner.containers.len())
            .finish()
    }
}

/// Builder wiring a CloudManagement together
pub struct CloudManagementBuilder {
    driver: Arc<dyn CloudManagementDriver>,
    node_discover: Option<Arc<dyn NodeDiscover>>,
    power_manager: PowerManager,
    services: BTreeMap<String, DriverConf>,
    containers: BTreeMap<String, DriverConf>,
    registry: Option<Arc<Registry>>,
}

impl CloudManagementBuilder {
    fn new(driver: Arc<dyn CloudManagementDriver>) -> Self {
        let services = driver.services();
        let containers = driver.containers();
        Self {
            driver,
            node_discover: None,
            power_manager: PowerManager::new(),
            services,
            containers,
            registry: None,
        }
    }

    pub fn node_discover(mut self, discover: Arc<dyn NodeDiscover>) -> Self {
        self.node_discover = Some(discover);
        self
    }

    pub fn power_driver(mut self, driver: Arc<dyn PowerDriver>) -> Self {
        self.power_manager.add_driver(driver);
        self
    }

    /// Merge service entries over the built-in catalog
    pub fn services(mut self, services: BTreeMap<String, DriverConf>) -> Self {
        self.services.extend(services);
        self
    }

    /// Merge container entries over the built-in catalog
    pub fn containers(mut self, containers: BTreeMap<String, DriverConf>) -> Self {
        self.containers.extend(containers);
        self
    }

    /// Registry used to build services and containers; the global one otherwise
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> CloudManagement {
        CloudManagement {
            inner: Arc::new(CloudInner {
                driver: self.driver,
                node_discover: self.node_discover,
                power_manager: self.power_manager,
                services: self.services,
                containers: self.containers,
                registry: self.registry,
            }),
        }
    }
}
