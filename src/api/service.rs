// ============================================================================
// File: os-faults/src/api/service.rs
// ----------------------------------------------------------------------------
// Service capability: host discovery plus lifecycle verbs for a named
// long-running program.
// ============================================================================

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::api::NodeCollection;
use crate::error::{OsFaultsError, Result};

/// A logically named program present on zero or more cloud nodes
///
/// Every verb takes an optional node collection. When absent the verb acts
/// on the nodes returned by [`Service::get_nodes`].
#[async_trait]
pub trait Service: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Nodes on which the service is currently present
    async fn get_nodes(&self) -> Result<NodeCollection>;

    async fn restart(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    async fn terminate(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    async fn start(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    /// Send SIGKILL to the service processes
    async fn kill(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    /// Pause the service processes, for `sec` seconds when given
    async fn freeze(&self, nodes: Option<&NodeCollection>, sec: Option<u64>) -> Result<()>;

    async fn unfreeze(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    /// Remove the DROP rule for the service port
    async fn plug(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    /// Add a DROP rule for the service port
    async fn unplug(&self, nodes: Option<&NodeCollection>) -> Result<()>;
}

/// Service verb selected at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Restart,
    Terminate,
    Start,
    Kill,
    Freeze,
    Unfreeze,
    Plug,
    Unplug,
}

impl ServiceAction {
    pub const ALL: [ServiceAction; 8] = [
        Self::Restart,
        Self::Terminate,
        Self::Start,
        Self::Kill,
        Self::Freeze,
        Self::Unfreeze,
        Self::Plug,
        Self::Unplug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Terminate => "terminate",
            Self::Start => "start",
            Self::Kill => "kill",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
            Self::Plug => "plug",
            Self::Unplug => "unplug",
        }
    }

    /// Invoke this verb on `service`
    ///
    /// `sec` is only meaningful for [`ServiceAction::Freeze`].
    pub async fn apply(
        self,
        service: &dyn Service,
        nodes: Option<&NodeCollection>,
        sec: Option<u64>,
    ) -> Result<()> {
        match self {
            Self::Restart => service.restart(nodes).await,
            Self::Terminate => service.terminate(nodes).await,
            Self::Start => service.start(nodes).await,
            Self::Kill => service.kill(nodes).await,
            Self::Freeze => service.freeze(nodes, sec).await,
            Self::Unfreeze => service.unfreeze(nodes).await,
            Self::Plug => service.plug(nodes).await,
            Self::Unplug => service.unplug(nodes).await,
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceAction {
    type Err = OsFaultsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| OsFaultsError::service(format!("Unknown service action '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_round_trip_through_names() {
        for action in ServiceAction::ALL {
            assert_eq!(action.as_str().parse::<ServiceAction>().ok(), Some(action));
        }
        assert!("explode".parse::<ServiceAction>().is_err());
    }
}
