// ============================================================================
// File: os-faults/src/registry/mod.rs
// ----------------------------------------------------------------------------
// Driver registry.
//
// Maps driver names to their specs. A spec carries the driver metadata, its
// argument schema and one constructor per capability it implements. The
// process-wide registry is built once from the built-in catalog; explicit
// registries can be assembled from any table of specs.
// ============================================================================

mod catalog;
mod context;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{
    CloudManagement, CloudManagementDriver, Container, NodeDiscover, PowerDriver, Service,
};
use crate::config::DriverConf;
use crate::error::{OsFaultsError, Result};

pub use catalog::builtin_drivers;
pub use context::DriverContext;

/// Cloud driver plus the discovery it provides, if any
pub struct CloudDriverParts {
    pub driver: Arc<dyn CloudManagementDriver>,
    pub node_discover: Option<Arc<dyn NodeDiscover>>,
}

pub type CloudCtor = fn(&Value, &DriverContext) -> Result<CloudDriverParts>;
pub type DiscoverCtor = fn(&Value, &DriverContext) -> Result<Arc<dyn NodeDiscover>>;
pub type PowerCtor = fn(&Value, &DriverContext) -> Result<Arc<dyn PowerDriver>>;
pub type ServiceCtor = fn(&str, &Value, &CloudManagement) -> Result<Arc<dyn Service>>;
pub type ContainerCtor = fn(&str, &Value, &CloudManagement) -> Result<Arc<dyn Container>>;

/// Registry entry for one driver
#[derive(Clone, Copy)]
pub struct DriverSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub config_schema: fn() -> Value,
    pub cloud_management: Option<CloudCtor>,
    pub node_discover: Option<DiscoverCtor>,
    pub power: Option<PowerCtor>,
    pub service: Option<ServiceCtor>,
    pub container: Option<ContainerCtor>,
}

impl DriverSpec {
    /// Spec with no capabilities; fill in constructors with struct update syntax
    pub const fn new(name: &'static str, description: &'static str, config_schema: fn() -> Value) -> Self {
        Self {
            name,
            description,
            config_schema,
            cloud_management: None,
            node_discover: None,
            power: None,
            service: None,
            container: None,
        }
    }

    /// Capability names implemented by this driver
    pub fn capabilities(&self) -> Vec<&'static str> {
        let mut caps = Vec::new();
        if self.cloud_management.is_some() {
            caps.push("cloud_management");
        }
        if self.node_discover.is_some() {
            caps.push("node_discover");
        }
        if self.power.is_some() {
            caps.push("power_management");
        }
        if self.service.is_some() {
            caps.push("service");
        }
        if self.container.is_some() {
            caps.push("container");
        }
        caps
    }

    /// Validate `args` against the driver's schema
    pub fn validate(&self, args: &Value) -> Result<()> {
        let schema = (self.config_schema)();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            OsFaultsError::config(format!("Driver '{}' has an invalid schema: {e}", self.name))
        })?;
        let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(OsFaultsError::config(format!(
                "Invalid args for driver '{}': {}",
                self.name,
                errors.join("; ")
            )))
        }
    }
}

impl fmt::Debug for DriverSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSpec")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Deserialise validated driver args into the driver's typed struct
pub(crate) fn parse_args<T: DeserializeOwned>(driver: &str, args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| OsFaultsError::config(format!("Invalid args for driver '{driver}': {e}")))
}

/// Name-indexed set of driver specs
#[derive(Debug, Clone)]
pub struct Registry {
    drivers: BTreeMap<&'static str, DriverSpec>,
}

static GLOBAL_REGISTRY: OnceLock<Result<Arc<Registry>>> = OnceLock::new();

impl Registry {
    /// Build a registry from an explicit table
    ///
    /// Specs without a name or named `base` are abstract and skipped.
    ///
    /// # Returns
    /// `DriverWithSuchNameExists` when two specs share a name
    pub fn from_specs<I: IntoIterator<Item = DriverSpec>>(specs: I) -> Result<Self> {
        let mut drivers = BTreeMap::new();
        for spec in specs {
            if spec.name.is_empty() || spec.name == "base" {
                continue;
            }
            if drivers.insert(spec.name, spec).is_some() {
                return Err(OsFaultsError::DriverWithSuchNameExists {
                    name: spec.name.to_string(),
                });
            }
        }
        debug!("Registered drivers: {:?}", drivers.keys().collect::<Vec<_>>());
        Ok(Self { drivers })
    }

    /// Process-wide registry of the built-in drivers
    pub fn global() -> Result<Arc<Registry>> {
        GLOBAL_REGISTRY
            .get_or_init(|| Registry::from_specs(builtin_drivers()).map(Arc::new))
            .clone()
    }

    pub fn get_drivers(&self) -> &BTreeMap<&'static str, DriverSpec> {
        &self.drivers
    }

    pub fn get_driver(&self, name: &str) -> Result<&DriverSpec> {
        self.drivers
            .get(name)
            .ok_or_else(|| OsFaultsError::DriverNotFound {
                name: name.to_string(),
            })
    }

    fn prepare(&self, conf: &DriverConf) -> Result<(&DriverSpec, Value)> {
        let spec = self.get_driver(&conf.driver)?;
        let args = conf.args_or_empty();
        spec.validate(&args)?;
        Ok((spec, args))
    }

    fn missing_capability(name: &str, capability: &str) -> OsFaultsError {
        OsFaultsError::config(format!("Driver '{name}' is not a {capability} driver"))
    }

    pub fn build_cloud_management(
        &self,
        conf: &DriverConf,
        ctx: &DriverContext,
    ) -> Result<CloudDriverParts> {
        let (spec, args) = self.prepare(conf)?;
        let ctor = spec
            .cloud_management
            .ok_or_else(|| Self::missing_capability(spec.name, "cloud management"))?;
        ctor(&args, ctx)
    }

    pub fn build_node_discover(
        &self,
        conf: &DriverConf,
        ctx: &DriverContext,
    ) -> Result<Arc<dyn NodeDiscover>> {
        let (spec, args) = self.prepare(conf)?;
        let ctor = spec
            .node_discover
            .ok_or_else(|| Self::missing_capability(spec.name, "node discover"))?;
        ctor(&args, ctx)
    }

    pub fn build_power(&self, conf: &DriverConf, ctx: &DriverContext) -> Result<Arc<dyn PowerDriver>> {
        let (spec, args) = self.prepare(conf)?;
        let ctor = spec
            .power
            .ok_or_else(|| Self::missing_capability(spec.name, "power management"))?;
        ctor(&args, ctx)
    }

    pub fn build_service(
        &self,
        name: &str,
        conf: &DriverConf,
        cloud: &CloudManagement,
    ) -> Result<Arc<dyn Service>> {
        let (spec, args) = self.prepare(conf)?;
        let ctor = spec
            .service
            .ok_or_else(|| Self::missing_capability(spec.name, "service"))?;
        ctor(name, &args, cloud)
    }

    pub fn build_container(
        &self,
        name: &str,
        conf: &DriverConf,
        cloud: &CloudManagement,
    ) -> Result<Arc<dyn Container>> {
        let (spec, args) = self.prepare(conf)?;
        let ctor = spec
            .container
            .ok_or_else(|| Self::missing_capability(spec.name, "container"))?;
        ctor(name, &args, cloud)
    }
}
