// ============================================================================
// File: os-faults/src/drivers/containers/mod.rs
// ----------------------------------------------------------------------------
// Container drivers
// ============================================================================

pub mod docker;

pub use docker::DockerContainer;
