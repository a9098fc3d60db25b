// ============================================================================
// File: os-faults/src/drivers/cloud/universal.rs
// ----------------------------------------------------------------------------
// `universal` cloud management driver: no knowledge of the deployment, only
// an SSH executor, an optional single address and the interface that the
// `default` network toggles.
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{CloudManagementDriver, Host, HostAuth, NodeCollection, NodeDiscover};
use crate::drivers::common::{auth_schema, serial_schema};
use crate::error::{OsFaultsError, Result};
use crate::executor::{RemoteExecutor, Task};
use crate::registry::{CloudDriverParts, DriverContext, DriverSpec, parse_args};

use super::executor_config;

pub const NAME: &str = "universal";

const NETWORKS: &[&str] = &["default"];

fn default_iface() -> String {
    "eth0".to_string()
}

#[derive(Debug, Deserialize)]
struct UniversalArgs {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    auth: Option<HostAuth>,
    #[serde(default = "default_iface")]
    iface: String,
    #[serde(default)]
    serial: Option<usize>,
}

fn config_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "address": {"type": "string"},
            "auth": auth_schema(),
            "iface": {"type": "string"},
            "serial": serial_schema()
        },
        "additionalProperties": false
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        cloud_management: Some(build),
        node_discover: Some(build_discover),
        ..DriverSpec::new(
            NAME,
            "Universal cloud management driver suitable for any deployment",
            config_schema,
        )
    }
}

fn build(args: &Value, ctx: &DriverContext) -> Result<CloudDriverParts> {
    let args: UniversalArgs = parse_args(NAME, args)?;
    let executor = ctx
        .executors
        .create(executor_config(args.auth.as_ref(), args.serial));
    Ok(CloudDriverParts {
        driver: Arc::new(UniversalDriver {
            executor,
            iface: args.iface,
        }),
        node_discover: Some(Arc::new(UniversalDiscover::new(args.address, args.auth))),
    })
}

fn build_discover(args: &Value, _ctx: &DriverContext) -> Result<Arc<dyn NodeDiscover>> {
    let args: UniversalArgs = parse_args(NAME, args)?;
    Ok(Arc::new(UniversalDiscover::new(args.address, args.auth)))
}

#[derive(Debug)]
pub struct UniversalDriver {
    executor: Arc<dyn RemoteExecutor>,
    iface: String,
}

impl UniversalDriver {
    async fn toggle_iface(&self, nodes: &NodeCollection, network: &str, up: bool) -> Result<()> {
        if !NETWORKS.contains(&network) {
            return Err(OsFaultsError::unsupported(NAME, format!("{network} network")));
        }
        let state = if up { "up" } else { "down" };
        info!("Setting {} {state} on nodes: {:?}", self.iface, nodes.get_ips());
        let task = Task::shell(format!("ip link set {} {state}", self.iface));
        nodes.run_task(&task, true).await.map(|_| ())
    }
}

#[async_trait]
impl CloudManagementDriver for UniversalDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn node_kind(&self) -> &'static str {
        "UniversalNodeCollection"
    }

    fn cloud_executor(&self) -> Arc<dyn RemoteExecutor> {
        Arc::clone(&self.executor)
    }

    fn supported_networks(&self) -> &'static [&'static str] {
        NETWORKS
    }

    async fn connect_network(&self, nodes: &NodeCollection, network: &str) -> Result<()> {
        self.toggle_iface(nodes, network, true).await
    }

    async fn disconnect_network(&self, nodes: &NodeCollection, network: &str) -> Result<()> {
        self.toggle_iface(nodes, network, false).await
    }
}

/// The configured address, if any, is the whole cloud
#[derive(Debug, Clone)]
pub struct UniversalDiscover {
    address: Option<String>,
    auth: Option<HostAuth>,
}

impl UniversalDiscover {
    /// # Arguments
    /// * `address` - The single node, if known
    /// * `auth` - Driver credentials carried by the discovered host
    pub fn new(address: Option<String>, auth: Option<HostAuth>) -> Self {
        Self { address, auth }
    }
}

#[async_trait]
impl NodeDiscover for UniversalDiscover {
    async fn discover_hosts(&self) -> Result<Vec<Host>> {
        Ok(self
            .address
            .iter()
            .map(|address| match &self.auth {
                Some(auth) => Host::new(address).with_auth(auth.clone()),
                None => Host::new(address),
            })
            .collect())
    }
}
