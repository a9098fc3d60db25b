// ============================================================================
// File: os-faults/src/api/human.rs
// ----------------------------------------------------------------------------
// Human API: one-line commands such as "restart keystone service on one
// node" or "reboot node-2.local node" bound to services, containers and
// node collections.
// ============================================================================

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use log::info;
use regex::{Captures, Regex};

use crate::api::{
    CloudManagement, Container, ContainerAction, NodeCollection, Service, ServiceAction,
};
use crate::error::{OsFaultsError, Result};

/// Aliases selecting one random node
const RANDOMNESS: &[&str] = &["one", "random", "single", "some"];

/// Alias selecting every node
const ANYTHING: &str = "all";

const SERVICE_ACTIONS: &str = "restart|terminate|start|kill|freeze|unfreeze|plug|unplug";
const CONTAINER_ACTIONS: &str = "restart|terminate|start";
const NODE_ACTIONS: &str = "reboot|poweroff|poweron|reset|shutdown";
const NODE_ALIASES: &str = "one|random|single|some|all";

/// Lookups the human API needs from a cloud
#[async_trait]
pub trait Destructor: Send + Sync {
    fn get_service(&self, name: &str) -> Result<Arc<dyn Service>>;

    fn get_container(&self, name: &str) -> Result<Arc<dyn Container>>;

    async fn get_nodes(&self, fqdns: Option<&[String]>) -> Result<NodeCollection>;
}

#[async_trait]
impl Destructor for CloudManagement {
    fn get_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        CloudManagement::get_service(self, name)
    }

    fn get_container(&self, name: &str) -> Result<Arc<dyn Container>> {
        CloudManagement::get_container(self, name)
    }

    async fn get_nodes(&self, fqdns: Option<&[String]>) -> Result<NodeCollection> {
        CloudManagement::get_nodes(self, fqdns).await
    }
}

struct Patterns {
    service: Regex,
    container: Regex,
    network: Regex,
    node: Regex,
}

impl Patterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            service: Regex::new(&format!(
                r"^(?P<action>{SERVICE_ACTIONS})\s+(?P<service>\S+)\s+service(?:\s+on(?:\s+(?P<node>\S+))?\s+nodes?)?(?:\s+for\s+(?P<duration>\d+)\s+seconds?)?$"
            ))?,
            container: Regex::new(&format!(
                r"^(?P<action>{CONTAINER_ACTIONS})\s+(?P<container>\S+)\s+container(?:\s+on(?:\s+(?P<node>\S+))?\s+nodes?)?$"
            ))?,
            network: Regex::new(&format!(
                r"^(?P<action>disable|enable)\s+network\s+(?P<network>\S+)\s+on\s+(?:(?P<alias>{NODE_ALIASES})\s+)?(?P<target>\S+)\s+nodes?$"
            ))?,
            node: Regex::new(&format!(
                r"^(?P<action>{NODE_ACTIONS})\s+(?:(?P<alias>{NODE_ALIASES})\s+)?(?P<target>\S+)\s+nodes?$"
            ))?,
        })
    }
}

static PATTERNS: OnceLock<std::result::Result<Patterns, regex::Error>> = OnceLock::new();

fn patterns() -> Result<&'static Patterns> {
    PATTERNS
        .get_or_init(Patterns::compile)
        .as_ref()
        .map_err(|e| OsFaultsError::Parse {
            message: format!("Invalid command pattern: {e}"),
        })
}

fn group(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).map(|m| m.as_str().to_string())
}

fn required(caps: &Captures<'_>, name: &str) -> Result<String> {
    group(caps, name).ok_or_else(|| OsFaultsError::Parse {
        message: format!("Command is missing '{name}'"),
    })
}

/// Which nodes a service or container verb targets
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeSelector {
    Default,
    Random,
    Fqdn(String),
}

impl NodeSelector {
    fn parse(node: Option<String>) -> Self {
        match node {
            None => Self::Default,
            Some(n) if n == ANYTHING => Self::Default,
            Some(n) if RANDOMNESS.contains(&n.as_str()) => Self::Random,
            Some(n) => Self::Fqdn(n),
        }
    }
}

/// Parse and run one human API command
///
/// # Arguments
/// * `destructor` - Cloud to act on
/// * `command` - Command text, matched case-insensitively
///
/// # Returns
/// `Parse` error when the text matches no known command
pub async fn execute<D>(destructor: &D, command: &str) -> Result<()>
where
    D: Destructor + ?Sized,
{
    let command = command.trim().to_lowercase();
    let patterns = patterns()?;

    if let Some(caps) = patterns.service.captures(&command) {
        let action: ServiceAction = required(&caps, "action")?.parse()?;
        let service = required(&caps, "service")?;
        let selector = NodeSelector::parse(group(&caps, "node"));
        let duration = group(&caps, "duration")
            .map(|d| d.parse::<u64>())
            .transpose()
            .map_err(|e| OsFaultsError::Parse {
                message: format!("Invalid duration: {e}"),
            })?;
        return run_service_action(destructor, action, &service, selector, duration).await;
    }

    if let Some(caps) = patterns.container.captures(&command) {
        let action: ContainerAction = required(&caps, "action")?.parse()?;
        let container = required(&caps, "container")?;
        let selector = NodeSelector::parse(group(&caps, "node"));
        return run_container_action(destructor, action, &container, selector).await;
    }

    if let Some(caps) = patterns.network.captures(&command) {
        let enable = required(&caps, "action")? == "enable";
        let network = required(&caps, "network")?;
        let nodes = resolve_target(
            destructor,
            group(&caps, "alias").as_deref(),
            &required(&caps, "target")?,
        )
        .await?;
        info!(
            "{} network {network} on nodes: {:?}",
            if enable { "Enable" } else { "Disable" },
            nodes.get_ips()
        );
        return if enable {
            nodes.connect(&network).await
        } else {
            nodes.disconnect(&network).await
        };
    }

    if let Some(caps) = patterns.node.captures(&command) {
        let action = required(&caps, "action")?;
        let nodes = resolve_target(
            destructor,
            group(&caps, "alias").as_deref(),
            &required(&caps, "target")?,
        )
        .await?;
        return match action.as_str() {
            "reboot" => nodes.reboot().await,
            "poweroff" => nodes.poweroff().await,
            "poweron" => nodes.poweron().await,
            "reset" => nodes.reset().await,
            "shutdown" => nodes.shutdown().await,
            other => Err(OsFaultsError::Parse {
                message: format!("Unknown node action '{other}'"),
            }),
        };
    }

    Err(OsFaultsError::Parse {
        message: format!("Could not parse command: {command}"),
    })
}

async fn run_service_action<D>(
    destructor: &D,
    action: ServiceAction,
    name: &str,
    selector: NodeSelector,
    duration: Option<u64>,
) -> Result<()>
where
    D: Destructor + ?Sized,
{
    if duration.is_some() && action != ServiceAction::Freeze {
        return Err(OsFaultsError::Parse {
            message: format!("Duration is not supported by '{action}' action"),
        });
    }

    let service = destructor.get_service(name)?;
    let nodes = match selector {
        NodeSelector::Default => None,
        NodeSelector::Random => Some(service.get_nodes().await?.pick(1)?),
        NodeSelector::Fqdn(fqdn) => Some(destructor.get_nodes(Some(&[fqdn])).await?),
    };

    info!("Run '{action}' on service {name}");
    action.apply(service.as_ref(), nodes.as_ref(), duration).await
}

async fn run_container_action<D>(
    destructor: &D,
    action: ContainerAction,
    name: &str,
    selector: NodeSelector,
) -> Result<()>
where
    D: Destructor + ?Sized,
{
    let container = destructor.get_container(name)?;
    let nodes = match selector {
        NodeSelector::Default => None,
        NodeSelector::Random => Some(container.get_nodes().await?.pick(1)?),
        NodeSelector::Fqdn(fqdn) => Some(destructor.get_nodes(Some(&[fqdn])).await?),
    };

    info!("Run '{action}' on container {name}");
    action.apply(container.as_ref(), nodes.as_ref()).await
}

/// Nodes named by a node command target
///
/// The target is a service name when the cloud knows it, a node alias, or
/// otherwise an FQDN.
async fn resolve_target<D>(destructor: &D, alias: Option<&str>, target: &str) -> Result<NodeCollection>
where
    D: Destructor + ?Sized,
{
    let (alias, nodes) = if target == ANYTHING || RANDOMNESS.contains(&target) {
        (Some(target), destructor.get_nodes(None).await?)
    } else {
        match destructor.get_service(target) {
            Ok(service) => (alias, service.get_nodes().await?),
            Err(OsFaultsError::Service { .. }) => {
                (alias, destructor.get_nodes(Some(&[target.to_string()])).await?)
            }
            Err(e) => return Err(e),
        }
    };

    match alias {
        Some(alias) if RANDOMNESS.contains(&alias) => nodes.pick(1),
        _ => Ok(nodes),
    }
}
