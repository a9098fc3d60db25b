// ============================================================================
// File: os-faults/src/drivers/power/virsh.rs
// ----------------------------------------------------------------------------
// Hypervisor client backed by the `virsh` command line tool
// ============================================================================

use std::sync::Arc;

use crate::error::Result;

use super::command::run_tool;
use super::libvirt::{Domain, Hypervisor, HypervisorConnector};

const VIRSH: &str = "virsh";

/// Connects through `virsh -c <uri>`
#[derive(Debug, Clone, Copy, Default)]
pub struct VirshConnector;

impl HypervisorConnector for VirshConnector {
    fn connect(&self, uri: &str) -> Result<Arc<dyn Hypervisor>> {
        let hypervisor = VirshHypervisor::new(uri);
        // Fails fast on an unreachable or misspelled URI.
        hypervisor.virsh(&["uri"])?;
        Ok(Arc::new(hypervisor))
    }
}

/// One libvirt connection URI driven through `virsh`
#[derive(Debug, Clone)]
pub struct VirshHypervisor {
    uri: String,
}

impl VirshHypervisor {
    pub fn new<U: Into<String>>(uri: U) -> Self {
        Self { uri: uri.into() }
    }

    fn virsh(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["-c", self.uri.as_str()];
        full.extend_from_slice(args);
        run_tool(VIRSH, &full, &[])
    }
}

impl Hypervisor for VirshHypervisor {
    fn list_domains(&self) -> Result<Vec<Domain>> {
        let names = self.virsh(&["list", "--all", "--name"])?;
        names
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                Ok(Domain {
                    name: name.to_string(),
                    xml: self.virsh(&["dumpxml", name])?,
                })
            })
            .collect()
    }

    fn destroy(&self, domain: &str) -> Result<()> {
        self.virsh(&["destroy", domain]).map(drop)
    }

    fn create(&self, domain: &str) -> Result<()> {
        self.virsh(&["start", domain]).map(drop)
    }

    fn reset(&self, domain: &str) -> Result<()> {
        self.virsh(&["reset", domain]).map(drop)
    }

    fn shutdown(&self, domain: &str) -> Result<()> {
        self.virsh(&["shutdown", domain]).map(drop)
    }

    fn suspend(&self, domain: &str) -> Result<()> {
        self.virsh(&["suspend", domain]).map(drop)
    }

    fn resume(&self, domain: &str) -> Result<()> {
        self.virsh(&["resume", domain]).map(drop)
    }

    fn is_active(&self, domain: &str) -> Result<bool> {
        // `domid` prints "-" for a domain that is not running.
        let id = self.virsh(&["domid", domain])?;
        Ok(!id.is_empty() && id != "-")
    }

    fn snapshot_create(&self, domain: &str, snapshot_name: &str) -> Result<()> {
        self.virsh(&["snapshot-create-as", domain, snapshot_name])
            .map(drop)
    }

    fn snapshot_revert(&self, domain: &str, snapshot_name: &str) -> Result<()> {
        self.virsh(&["snapshot-revert", domain, snapshot_name])
            .map(drop)
    }
}
