// ============================================================================
// File: os-faults/src/drivers/power/ipmitool.rs
// ----------------------------------------------------------------------------
// BMC client backed by the `ipmitool` command line tool
// ============================================================================

use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Result;

use super::command::run_tool;
use super::ipmi::{BmcClient, BmcCredentials, PowerResponse, PowerState};

const IPMITOOL: &str = "ipmitool";

/// Runs `ipmitool -I <interface> chassis power ...`
///
/// The password is passed in `IPMI_PASSWORD`, never on the command line.
#[derive(Debug, Clone)]
pub struct IpmitoolClient {
    pub interface: String,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for IpmitoolClient {
    fn default() -> Self {
        Self {
            interface: "lanplus".to_string(),
            wait_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl IpmitoolClient {
    fn chassis_power(&self, bmc: &BmcCredentials, verb: &str) -> Result<String> {
        run_tool(
            IPMITOOL,
            &[
                "-I",
                &self.interface,
                "-H",
                &bmc.address,
                "-U",
                &bmc.username,
                "-E",
                "chassis",
                "power",
                verb,
            ],
            &[("IPMI_PASSWORD", &bmc.password)],
        )
    }

    fn power_status(&self, bmc: &BmcCredentials) -> Result<String> {
        let out = self.chassis_power(bmc, "status")?;
        Ok(parse_power_status(&out))
    }
}

/// Last word of "Chassis Power is on"
fn parse_power_status(output: &str) -> String {
    output
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_lowercase()
}

impl BmcClient for IpmitoolClient {
    fn set_power(&self, bmc: &BmcCredentials, state: PowerState, wait: bool) -> Result<PowerResponse> {
        self.chassis_power(bmc, state.as_str())?;

        if state == PowerState::Reset || !wait {
            return Ok(PowerResponse::default());
        }

        let target = match state {
            PowerState::On => "on",
            _ => "off",
        };
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            let current = self.power_status(bmc)?;
            debug!("BMC {} reports power {current}", bmc.address);
            if current == target {
                return Ok(PowerResponse {
                    powerstate: Some(current),
                    error: None,
                });
            }
            if Instant::now() >= deadline {
                return Ok(PowerResponse {
                    powerstate: Some(current),
                    error: Some(format!("timed out waiting for power {target}")),
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}
