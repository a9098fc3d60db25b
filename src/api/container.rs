// ============================================================================
// File: os-faults/src/api/container.rs
// ----------------------------------------------------------------------------
// Container capability
// ============================================================================

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::api::NodeCollection;
use crate::error::{OsFaultsError, Result};

/// A named container present on zero or more cloud nodes
#[async_trait]
pub trait Container: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Nodes on which the container currently runs
    async fn get_nodes(&self) -> Result<NodeCollection>;

    async fn restart(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    async fn terminate(&self, nodes: Option<&NodeCollection>) -> Result<()>;

    async fn start(&self, nodes: Option<&NodeCollection>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Restart,
    Terminate,
    Start,
}

impl ContainerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Terminate => "terminate",
            Self::Start => "start",
        }
    }

    pub async fn apply(self, container: &dyn Container, nodes: Option<&NodeCollection>) -> Result<()> {
        match self {
            Self::Restart => container.restart(nodes).await,
            Self::Terminate => container.terminate(nodes).await,
            Self::Start => container.start(nodes).await,
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerAction {
    type Err = OsFaultsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "restart" => Ok(Self::Restart),
            "terminate" => Ok(Self::Terminate),
            "start" => Ok(Self::Start),
            other => Err(OsFaultsError::container(format!(
                "Unknown container action '{other}'"
            ))),
        }
    }
}
