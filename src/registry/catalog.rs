// ============================================================================
// File: os-faults/src/registry/catalog.rs
// ----------------------------------------------------------------------------
// Built-in driver table
// ============================================================================

use crate::drivers::{cloud, containers, discover, power, services};

use super::DriverSpec;

/// Every driver shipped with the crate
pub fn builtin_drivers() -> Vec<DriverSpec> {
    let mut specs = vec![
        cloud::universal::spec(),
        cloud::devstack::spec(),
        cloud::fuel::spec(),
        cloud::saltcloud::spec(),
        discover::node_list::spec(),
        power::libvirt::spec(),
        power::ipmi::spec(),
        containers::docker::spec(),
    ];
    specs.extend(services::specs());
    specs
}
