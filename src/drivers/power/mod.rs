// ============================================================================
// File: os-faults/src/drivers/power/mod.rs
// ----------------------------------------------------------------------------
// Power drivers and the out-of-band clients they talk through.
//
// - libvirt: hypervisor-controlled virtual machines (`virsh` client)
// - ipmi: physical servers behind a BMC (`ipmitool` client)
// ============================================================================

mod command;
pub mod ipmi;
mod ipmitool;
pub mod libvirt;
mod virsh;

pub use ipmi::{BmcClient, BmcCredentials, IpmiDriver, PowerResponse, PowerState};
pub use ipmitool::IpmitoolClient;
pub use libvirt::{Domain, Hypervisor, HypervisorConnector, LibvirtDriver};
pub use virsh::{VirshConnector, VirshHypervisor};
