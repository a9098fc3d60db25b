// ============================================================================
// File: os-faults/src/drivers/cloud/fuel.rs
// ----------------------------------------------------------------------------
// `fuel` cloud management driver.
//
// The Fuel master knows the inventory; slaves are reached as root through
// the master unless direct SSH is allowed.
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::api::{CloudManagementDriver, Host, JumpHost, NodeCollection, NodeDiscover};
use crate::config::DriverConf;
use crate::drivers::common::serial_schema;
use crate::error::{OsFaultsError, Result};
use crate::executor::{ExecutorConfig, LinkOperation, NetworkMgmtTask, RemoteExecutor, Task};
use crate::registry::{CloudDriverParts, DriverContext, DriverSpec, parse_args};

use super::{catalog, run_on_master};

pub const NAME: &str = "fuel";

const NETWORKS: &[&str] = &["management", "private", "public", "storage"];

#[derive(Debug, Deserialize)]
struct FuelArgs {
    address: String,
    username: String,
    #[serde(default)]
    private_key_file: Option<String>,
    #[serde(default)]
    slave_direct_ssh: bool,
    #[serde(default)]
    serial: Option<usize>,
}

fn config_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "address": {"type": "string"},
            "username": {"type": "string"},
            "private_key_file": {"type": "string"},
            "slave_direct_ssh": {"type": "boolean"},
            "serial": serial_schema()
        },
        "required": ["address", "username"],
        "additionalProperties": false
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        cloud_management: Some(build),
        node_discover: Some(build_discover),
        ..DriverSpec::new(NAME, "Fuel 9.x cloud management driver", config_schema)
    }
}

fn create(args: &Value, ctx: &DriverContext) -> Result<Arc<FuelDriver>> {
    let args: FuelArgs = parse_args(NAME, args)?;

    let master = ctx.executors.create(
        ExecutorConfig::new(args.username.clone())
            .with_private_key_file(args.private_key_file.clone())
            .with_serial(args.serial),
    );

    let jump = (!args.slave_direct_ssh).then(|| JumpHost {
        host: args.address.clone(),
        username: Some(args.username.clone()),
        private_key_file: args.private_key_file.clone(),
    });
    let cloud = ctx.executors.create(
        ExecutorConfig::new("root")
            .with_private_key_file(args.private_key_file)
            .with_jump(jump)
            .with_serial(args.serial),
    );

    Ok(Arc::new(FuelDriver {
        address: args.address,
        master,
        cloud,
        hosts: OnceCell::new(),
    }))
}

fn build(args: &Value, ctx: &DriverContext) -> Result<CloudDriverParts> {
    let driver = create(args, ctx)?;
    Ok(CloudDriverParts {
        driver: driver.clone(),
        node_discover: Some(driver),
    })
}

fn build_discover(args: &Value, ctx: &DriverContext) -> Result<Arc<dyn NodeDiscover>> {
    Ok(create(args, ctx)?)
}

/// Entry of `fuel node --json`
#[derive(Debug, Deserialize)]
struct FuelNode {
    ip: String,
    mac: String,
    fqdn: String,
}

#[derive(Debug)]
pub struct FuelDriver {
    address: String,
    master: Arc<dyn RemoteExecutor>,
    cloud: Arc<dyn RemoteExecutor>,
    hosts: OnceCell<Vec<Host>>,
}

impl FuelDriver {
    async fn discover(&self) -> Result<Vec<Host>> {
        let stdout = run_on_master(&self.master, &self.address, "fuel node --json".to_string()).await?;
        let nodes: Vec<FuelNode> = serde_json::from_str(&stdout).map_err(|e| {
            OsFaultsError::discovery(format!("Cannot parse Fuel node list: {e}"))
        })?;
        let hosts: Vec<Host> = nodes
            .into_iter()
            .map(|node| Host::new(node.ip).with_mac(node.mac).with_fqdn(node.fqdn))
            .collect();
        debug!("Fuel hosts: {hosts:?}");
        Ok(hosts)
    }

    async fn toggle(&self, nodes: &NodeCollection, network: &str, operation: LinkOperation) -> Result<()> {
        if !NETWORKS.contains(&network) {
            return Err(OsFaultsError::unsupported(NAME, format!("{network} network")));
        }
        info!("Setting {network} network {operation:?} on nodes: {:?}", nodes.get_ips());
        let task = Task::FuelNetworkMgmt(NetworkMgmtTask {
            network_name: network.to_string(),
            operation,
        });
        nodes.run_task(&task, true).await.map(|_| ())
    }
}

#[async_trait]
impl NodeDiscover for FuelDriver {
    async fn discover_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.get_or_try_init(|| self.discover()).await?.clone())
    }
}

#[async_trait]
impl CloudManagementDriver for FuelDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn node_kind(&self) -> &'static str {
        "FuelNodeCollection"
    }

    fn cloud_executor(&self) -> Arc<dyn RemoteExecutor> {
        Arc::clone(&self.cloud)
    }

    fn services(&self) -> BTreeMap<String, DriverConf> {
        let linux = |service: &str, grep: &str| json!({"linux_service": service, "grep": grep});
        let pcs_or_linux = |pcs: &str, service: &str, grep: &str| {
            json!({"pcs_service": pcs, "linux_service": service, "grep": grep})
        };
        catalog(vec![
            ("keystone", "linux_service", linux("apache2", "keystone")),
            ("horizon", "linux_service", linux("apache2", "apache2")),
            ("memcached", "linux_service", linux("memcached", "memcached")),
            ("mysql", "pcs_service", json!({
                "pcs_service": "p_mysqld",
                "grep": "mysqld",
                "port": ["tcp", 3307]
            })),
            ("rabbitmq", "pcs_service", json!({
                "pcs_service": "p_rabbitmq-server",
                "grep": "rabbit tcp_listeners",
                "port": ["tcp", 5673]
            })),
            ("glance-api", "linux_service", linux("glance-api", "glance-api")),
            ("glance-registry", "linux_service", linux("glance-registry", "glance-registry")),
            ("nova-api", "linux_service", linux("nova-api", "nova-api")),
            ("nova-compute", "linux_service", linux("nova-compute", "nova-compute")),
            ("nova-scheduler", "linux_service", linux("nova-scheduler", "nova-scheduler")),
            ("nova-conductor", "linux_service", linux("nova-conductor", "nova-conductor")),
            ("neutron-server", "linux_service", linux("neutron-server", "neutron-server")),
            ("neutron-dhcp-agent", "pcs_or_linux_service", pcs_or_linux(
                "neutron-dhcp-agent",
                "neutron-dhcp-agent",
                "neutron-dhcp-agent",
            )),
            ("neutron-l3-agent", "pcs_or_linux_service", pcs_or_linux(
                "neutron-l3-agent",
                "neutron-l3-agent",
                "neutron-l3-agent",
            )),
            ("neutron-openvswitch-agent", "pcs_or_linux_service", pcs_or_linux(
                "neutron-openvswitch-agent",
                "neutron-openvswitch-agent",
                "neutron-openvswitch-agent",
            )),
            ("heat-api", "linux_service", linux("heat-api", "heat-api")),
            ("heat-engine", "pcs_service", json!({"pcs_service": "p_heat-engine", "grep": "heat-engine"})),
            ("cinder-api", "linux_service", linux("cinder-api", "cinder-api")),
            ("cinder-volume", "linux_service", linux("cinder-volume", "cinder-volume")),
        ])
    }

    fn supported_networks(&self) -> &'static [&'static str] {
        NETWORKS
    }

    async fn connect_network(&self, nodes: &NodeCollection, network: &str) -> Result<()> {
        self.toggle(nodes, network, LinkOperation::Up).await
    }

    async fn disconnect_network(&self, nodes: &NodeCollection, network: &str) -> Result<()> {
        self.toggle(nodes, network, LinkOperation::Down).await
    }
}
