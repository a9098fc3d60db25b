// ============================================================================
// File: os-faults/src/api/node_discover.rs
// ----------------------------------------------------------------------------
// NodeDiscover capability
// ============================================================================

use std::fmt;

use async_trait::async_trait;

use crate::api::Host;
use crate::error::Result;

/// Learns the current set of hosts in the cloud
#[async_trait]
pub trait NodeDiscover: Send + Sync + fmt::Debug {
    async fn discover_hosts(&self) -> Result<Vec<Host>>;
}
