// ============================================================================
// File: os-faults/src/drivers/cloud/mod.rs
// ----------------------------------------------------------------------------
// Cloud management drivers.
//
// Each driver is also the node discover of its cloud. Drivers reaching the
// cloud through a master node keep two executors: one for the master and
// one for the cloud nodes.
// ============================================================================

pub mod devstack;
pub mod fuel;
pub mod saltcloud;
pub mod universal;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::api::{Host, HostAuth};
use crate::config::DriverConf;
use crate::error::{OsFaultsError, Result};
use crate::executor::{DEFAULT_ERROR_STATUSES, ExecutorConfig, RemoteExecutor, Task};

pub use devstack::DevStackDriver;
pub use fuel::FuelDriver;
pub use saltcloud::SaltCloudDriver;
pub use universal::{UniversalDiscover, UniversalDriver};

/// Executor settings from an optional `auth` block
pub(crate) fn executor_config(auth: Option<&HostAuth>, serial: Option<usize>) -> ExecutorConfig {
    let auth = auth.cloned().unwrap_or_default();
    ExecutorConfig::new(auth.username.unwrap_or_else(|| "root".to_string()))
        .with_password(auth.password)
        .with_private_key_file(auth.private_key_file)
        .with_become(auth.r#become.unwrap_or(false), auth.become_password)
        .with_jump(auth.jump)
        .with_serial(serial)
        .with_become_method(auth.become_method)
}

/// Service catalog from `(name, driver, args)` rows
pub(crate) fn catalog(entries: Vec<(&str, &str, Value)>) -> BTreeMap<String, DriverConf> {
    entries
        .into_iter()
        .map(|(name, driver, args)| (name.to_string(), DriverConf::new(driver, args)))
        .collect()
}

/// Run a command on a master node and return its stdout
pub(crate) async fn run_on_master(
    executor: &Arc<dyn RemoteExecutor>,
    master: &str,
    command: String,
) -> Result<String> {
    let records = executor
        .execute(&[Host::new(master)], &Task::command(command), DEFAULT_ERROR_STATUSES)
        .await?;
    records
        .into_iter()
        .next()
        .map(|record| record.payload.stdout)
        .ok_or_else(|| OsFaultsError::discovery(format!("No output from master node {master}")))
}
