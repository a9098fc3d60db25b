// ============================================================================
// File: os-faults/src/config/mod.rs
// ----------------------------------------------------------------------------
// Cloud configuration document.
//
// Documents are read from YAML or JSON, validated against the top-level
// schema and deserialised into `CloudConfig`. Driver args stay untyped here;
// the registry validates them against each driver's own schema.
// ============================================================================

mod schema;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OsFaultsError, Result};

pub use schema::config_schema;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "OS_FAULTS_CONFIG";

const CONFIG_FILES: &[&str] = &["os-faults.json", "os-faults.yaml", "os-faults.yml"];

/// Reference to a driver and its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConf {
    pub driver: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

impl DriverConf {
    pub fn new<D: Into<String>>(driver: D, args: Value) -> Self {
        Self {
            driver: driver.into(),
            args,
        }
    }

    /// Arguments, with a missing value read as an empty object
    pub fn args_or_empty(&self) -> Value {
        if self.args.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            self.args.clone()
        }
    }
}

/// Complete configuration of one cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub cloud_management: DriverConf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_discover: Option<DriverConf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub power_managements: Vec<DriverConf>,

    /// Deprecated single power driver, applied after `power_managements`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_management: Option<DriverConf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, DriverConf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, DriverConf>,
}

impl CloudConfig {
    /// Minimal config for a cloud management driver
    pub fn new(cloud_management: DriverConf) -> Self {
        Self {
            cloud_management,
            node_discover: None,
            power_managements: Vec::new(),
            power_management: None,
            services: BTreeMap::new(),
            containers: BTreeMap::new(),
        }
    }

    /// Validate a raw document and deserialise it
    pub fn from_value(value: Value) -> Result<Self> {
        validate_document(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_value(serde_yaml::from_str(text)?)
    }

    /// Read a config file, choosing the format by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading configuration from {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            OsFaultsError::config(format!("Cannot read config file {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Power drivers in the order they are added to the power manager
    pub fn power_drivers(&self) -> impl Iterator<Item = &DriverConf> {
        self.power_managements
            .iter()
            .chain(self.power_management.iter())
    }
}

fn validate_document(value: &Value) -> Result<()> {
    let schema = config_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| OsFaultsError::config(format!("Invalid configuration schema: {e}")))?;
    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(OsFaultsError::config(format!(
            "Invalid configuration: {}",
            errors.join("; ")
        )))
    }
}

/// Candidate config locations, most specific first
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(home) = env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".config").join("os-faults"));
    }
    dirs.push(PathBuf::from("/etc/openstack"));

    dirs.iter()
        .flat_map(|dir| CONFIG_FILES.iter().map(move |file| dir.join(file)))
        .collect()
}

/// Locate the configuration file
///
/// # Arguments
/// * `explicit` - Path given by the caller; wins over everything else
///
/// # Returns
/// The explicit path, then `$OS_FAULTS_CONFIG`, then the first existing
/// default location
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let candidates = default_config_paths();
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| {
            let searched = candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            OsFaultsError::config(format!(
                "Config file is not found on any of paths: {searched}"
            ))
        })
}
