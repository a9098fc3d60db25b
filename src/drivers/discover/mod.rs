// ============================================================================
// File: os-faults/src/drivers/discover/mod.rs
// ----------------------------------------------------------------------------
// Standalone node discover drivers
// ============================================================================

pub mod node_list;

pub use node_list::NodeListDiscover;
