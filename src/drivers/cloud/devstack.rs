// ============================================================================
// File: os-faults/src/drivers/cloud/devstack.rs
// ----------------------------------------------------------------------------
// `devstack` cloud management driver.
//
// DevStack runs every service on one node (optionally with extra compute
// slaves), so discovery asks each configured address for its MAC and
// hostname once and keeps the answer.
// ============================================================================

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::api::{CloudManagementDriver, Host, HostAuth, NodeCollection, NodeDiscover};
use crate::config::DriverConf;
use crate::drivers::common::{auth_schema, serial_schema};
use crate::error::{OsFaultsError, Result};
use crate::executor::{DEFAULT_ERROR_STATUSES, RemoteExecutor, Task, TaskRecord};
use crate::registry::{CloudDriverParts, DriverContext, DriverSpec, parse_args};

use super::{catalog, executor_config};

pub const NAME: &str = "devstack";

const NETWORKS: &[&str] = &["all-in-one"];

fn default_iface() -> String {
    "eth0".to_string()
}

#[derive(Debug, Deserialize)]
struct DevStackArgs {
    address: String,
    #[serde(default)]
    auth: Option<HostAuth>,
    #[serde(default)]
    slaves: Vec<String>,
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
            "slaves": {"type": "array", "items": {"type": "string"}},
            "iface": {"type": "string"},
            "serial": serial_schema()
        },
        "required": ["address"],
        "additionalProperties": false
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        cloud_management: Some(build),
        node_discover: Some(build_discover),
        ..DriverSpec::new(NAME, "DevStack management driver", config_schema)
    }
}

fn create(args: &Value, ctx: &DriverContext) -> Result<Arc<DevStackDriver>> {
    let args: DevStackArgs = parse_args(NAME, args)?;
    let executor = ctx
        .executors
        .create(executor_config(args.auth.as_ref(), args.serial));
    Ok(Arc::new(DevStackDriver::new(
        executor,
        args.address,
        args.slaves,
        args.iface,
    )))
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

#[derive(Debug)]
pub struct DevStackDriver {
    executor: Arc<dyn RemoteExecutor>,
    addresses: Vec<String>,
    iface: String,
    hosts: OnceCell<Vec<Host>>,
}

impl DevStackDriver {
    /// # Arguments
    /// * `executor` - Executor reaching the DevStack node and its slaves
    /// * `address` - Main DevStack node
    /// * `slaves` - Additional nodes
    /// * `iface` - Interface whose MAC identifies each node
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        address: String,
        slaves: Vec<String>,
        iface: String,
    ) -> Self {
        let addresses = std::iter::once(address).chain(slaves).collect();
        Self {
            executor,
            addresses,
            iface,
            hosts: OnceCell::new(),
        }
    }

    async fn stdout_by_host(&self, hosts: &[Host], command: String) -> Result<HashMap<String, String>> {
        let records = self
            .executor
            .execute(hosts, &Task::command(command), DEFAULT_ERROR_STATUSES)
            .await?;
        Ok(records
            .into_iter()
            .map(|TaskRecord { host, payload, .. }| (host, payload.stdout.trim().to_string()))
            .collect())
    }

    async fn discover(&self) -> Result<Vec<Host>> {
        let targets: Vec<Host> = self.addresses.iter().map(Host::new).collect();
        let macs = self
            .stdout_by_host(&targets, format!("cat /sys/class/net/{}/address", self.iface))
            .await?;
        let names = self.stdout_by_host(&targets, "hostname".to_string()).await?;

        let mut hosts = Vec::with_capacity(targets.len());
        for ip in &self.addresses {
            let mac = macs
                .get(ip)
                .ok_or_else(|| OsFaultsError::discovery(format!("No MAC address reported by {ip}")))?;
            let fqdn = names
                .get(ip)
                .ok_or_else(|| OsFaultsError::discovery(format!("No hostname reported by {ip}")))?;
            hosts.push(Host::new(ip).with_mac(mac).with_fqdn(fqdn));
        }
        debug!("DevStack hosts: {hosts:?}");
        Ok(hosts)
    }

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
impl NodeDiscover for DevStackDriver {
    async fn discover_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.get_or_try_init(|| self.discover()).await?.clone())
    }
}

#[async_trait]
impl CloudManagementDriver for DevStackDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn node_kind(&self) -> &'static str {
        "DevStackNodeCollection"
    }

    fn cloud_executor(&self) -> Arc<dyn RemoteExecutor> {
        Arc::clone(&self.executor)
    }

    fn services(&self) -> BTreeMap<String, DriverConf> {
        let systemd = |unit: &str, grep: &str| json!({"systemd_service": unit, "grep": grep});
        catalog(vec![
            ("keystone", "process", json!({
                "grep": "keystone-uwsgi",
                "restart_cmd": "systemctl restart devstack@keystone",
                "terminate_cmd": "systemctl stop devstack@keystone",
                "start_cmd": "systemctl start devstack@keystone"
            })),
            ("mysql", "process", json!({
                "grep": "mysqld",
                "restart_cmd": "service mysql restart",
                "terminate_cmd": "service mysql stop",
                "start_cmd": "service mysql start",
                "port": ["tcp", 3307]
            })),
            ("rabbitmq", "process", json!({
                "grep": "rabbitmq_server",
                "restart_cmd": "service rabbitmq-server restart",
                "terminate_cmd": "service rabbitmq-server stop",
                "start_cmd": "service rabbitmq-server start"
            })),
            ("glance-api", "systemd_service", systemd("devstack@g-api", "glance-api")),
            ("nova-api", "systemd_service", systemd("devstack@n-api", "nova-api")),
            ("nova-compute", "systemd_service", systemd("devstack@n-cpu", "nova-compute")),
            ("nova-scheduler", "systemd_service", systemd("devstack@n-sch", "nova-scheduler")),
            ("neutron-server", "systemd_service", systemd("devstack@q-svc", "neutron-server")),
            ("heat-api", "systemd_service", systemd("devstack@h-api", "heat-api")),
            ("cinder-api", "systemd_service", systemd("devstack@c-api", "cinder-api")),
        ])
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
