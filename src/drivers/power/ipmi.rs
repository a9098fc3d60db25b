// ============================================================================
// File: os-faults/src/drivers/power/ipmi.rs
// ----------------------------------------------------------------------------
// `ipmi` power driver for physical servers behind a BMC
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api::{Host, PowerDriver};
use crate::drivers::common::MAC_PATTERN;
use crate::error::{OsFaultsError, Result};
use crate::registry::{DriverContext, DriverSpec, parse_args};

pub const NAME: &str = "ipmi";

/// BMC endpoint and login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmcCredentials {
    pub address: String,
    pub username: String,
    pub password: String,
}

/// Requested chassis power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    /// Graceful shutdown through ACPI
    Soft,
    Reset,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Soft => "soft",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BMC answer to a power request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerResponse {
    /// Power state observed after the request
    pub powerstate: Option<String>,
    pub error: Option<String>,
}

/// Client able to change chassis power through a BMC
pub trait BmcClient: Send + Sync + fmt::Debug {
    /// Request `state`, waiting for it to settle when `wait` is set
    fn set_power(&self, bmc: &BmcCredentials, state: PowerState, wait: bool) -> Result<PowerResponse>;
}

#[derive(Debug, Default, Deserialize)]
struct IpmiArgs {
    #[serde(default)]
    mac_to_bmc: HashMap<String, BmcCredentials>,
    #[serde(default)]
    fqdn_to_bmc: HashMap<String, BmcCredentials>,
}

fn config_schema() -> Value {
    let bmc = json!({
        "type": "object",
        "properties": {
            "address": {"type": "string"},
            "username": {"type": "string"},
            "password": {"type": "string"}
        },
        "required": ["address", "username", "password"],
        "additionalProperties": false
    });
    json!({
        "type": "object",
        "properties": {
            "mac_to_bmc": {
                "type": "object",
                "patternProperties": {MAC_PATTERN: bmc.clone()},
                "additionalProperties": false
            },
            "fqdn_to_bmc": {
                "type": "object",
                "additionalProperties": bmc
            }
        },
        "anyOf": [
            {"required": ["mac_to_bmc"]},
            {"required": ["fqdn_to_bmc"]}
        ],
        "additionalProperties": false
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        power: Some(build),
        ..DriverSpec::new(NAME, "IPMI power management driver", config_schema)
    }
}

fn build(args: &Value, ctx: &DriverContext) -> Result<Arc<dyn PowerDriver>> {
    let args: IpmiArgs = parse_args(NAME, args)?;
    Ok(Arc::new(IpmiDriver::new(
        args.mac_to_bmc,
        args.fqdn_to_bmc,
        Arc::clone(&ctx.bmc),
    )))
}

/// Power driver issuing chassis power requests to BMCs
#[derive(Debug)]
pub struct IpmiDriver {
    mac_to_bmc: HashMap<String, BmcCredentials>,
    fqdn_to_bmc: HashMap<String, BmcCredentials>,
    client: Arc<dyn BmcClient>,
}

impl IpmiDriver {
    pub fn new(
        mac_to_bmc: HashMap<String, BmcCredentials>,
        fqdn_to_bmc: HashMap<String, BmcCredentials>,
        client: Arc<dyn BmcClient>,
    ) -> Self {
        Self {
            mac_to_bmc: mac_to_bmc
                .into_iter()
                .map(|(mac, bmc)| (mac.to_lowercase(), bmc))
                .collect(),
            fqdn_to_bmc,
            client,
        }
    }

    fn find_bmc(&self, host: &Host) -> Result<&BmcCredentials> {
        host.mac
            .as_ref()
            .and_then(|mac| self.mac_to_bmc.get(&mac.to_lowercase()))
            .or_else(|| host.fqdn.as_ref().and_then(|fqdn| self.fqdn_to_bmc.get(fqdn)))
            .ok_or_else(|| OsFaultsError::power(format!("BMC for {host} not found!")))
    }

    fn set_power(&self, host: &Host, state: PowerState, expected: Option<&str>) -> Result<()> {
        let bmc = self.find_bmc(host)?;
        debug!("Requesting power {state} from BMC {} for {host}", bmc.address);

        let response = self.client.set_power(bmc, state, true).map_err(|e| {
            error!("IPMI cmd '{state}' failed on bmc '{}', {host}: {e}", bmc.address);
            e
        })?;
        debug!("IPMI response: {response:?}");

        let mismatch = expected.is_some_and(|e| response.powerstate.as_deref() != Some(e));
        if response.error.is_some() || mismatch {
            return Err(OsFaultsError::power(format!(
                "Failed to change power state to '{}' on bmc '{}', {host}",
                expected.unwrap_or(state.as_str()),
                bmc.address
            )));
        }
        Ok(())
    }
}

impl PowerDriver for IpmiDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, host: &Host) -> bool {
        self.find_bmc(host).is_ok()
    }

    fn poweroff(&self, host: &Host) -> Result<()> {
        self.set_power(host, PowerState::Off, Some("off"))?;
        info!("Node powered off: {host}");
        Ok(())
    }

    fn poweron(&self, host: &Host) -> Result<()> {
        self.set_power(host, PowerState::On, Some("on"))?;
        info!("Node powered on: {host}");
        Ok(())
    }

    fn reset(&self, host: &Host) -> Result<()> {
        self.set_power(host, PowerState::Reset, None)?;
        info!("Node reset: {host}");
        Ok(())
    }

    fn shutdown(&self, host: &Host) -> Result<()> {
        self.set_power(host, PowerState::Soft, Some("off"))?;
        info!("Node is off: {host}");
        Ok(())
    }
}
