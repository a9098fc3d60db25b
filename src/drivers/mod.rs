// ============================================================================
// File: os-faults/src/drivers/mod.rs
// ----------------------------------------------------------------------------
// Built-in drivers.
//
// - cloud: cloud management drivers (each is also a node discover)
// - discover: static node list
// - power: libvirt and IPMI power drivers with their clients
// - services / containers: process and docker lifecycle drivers
// ============================================================================

pub mod cloud;
mod common;
pub mod containers;
pub mod discover;
pub mod power;
pub mod services;
