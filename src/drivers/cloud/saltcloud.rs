// ============================================================================
// File: os-faults/src/drivers/cloud/saltcloud.rs
// ----------------------------------------------------------------------------
// `saltcloud` cloud management driver: inventory comes from the Salt master
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::api::{CloudManagementDriver, Host, JumpHost, NodeDiscover};
use crate::config::DriverConf;
use crate::drivers::common::serial_schema;
use crate::error::{OsFaultsError, Result};
use crate::executor::{ExecutorConfig, RemoteExecutor, shell_quote};
use crate::registry::{CloudDriverParts, DriverContext, DriverSpec, parse_args};

use super::{catalog, run_on_master};

pub const NAME: &str = "saltcloud";

fn default_slave_name_regexp() -> String {
    "^(?!cfg|mon)".to_string()
}

fn default_get_ips_cmd() -> String {
    "pillar.get _param:single_address".to_string()
}

#[derive(Debug, Deserialize)]
struct SaltCloudArgs {
    address: String,
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    private_key_file: Option<String>,
    #[serde(default)]
    r#become: Option<bool>,
    #[serde(default)]
    slave_username: Option<String>,
    #[serde(default)]
    slave_password: Option<String>,
    #[serde(default)]
    slave_private_key_file: Option<String>,
    #[serde(default)]
    slave_become: Option<bool>,
    #[serde(default = "default_slave_name_regexp")]
    slave_name_regexp: String,
    #[serde(default)]
    slave_direct_ssh: bool,
    #[serde(default = "default_get_ips_cmd")]
    get_ips_cmd: String,
    #[serde(default)]
    serial: Option<usize>,
}

fn config_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "address": {"type": "string"},
            "username": {"type": "string"},
            "password": {"type": "string"},
            "private_key_file": {"type": "string"},
            "become": {"type": "boolean"},
            "slave_username": {"type": "string"},
            "slave_password": {"type": "string"},
            "slave_private_key_file": {"type": "string"},
            "slave_become": {"type": "boolean"},
            "slave_name_regexp": {"type": "string"},
            "slave_direct_ssh": {"type": "boolean"},
            "get_ips_cmd": {"type": "string"},
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
        ..DriverSpec::new(NAME, "SaltCloud management driver", config_schema)
    }
}

fn create(args: &Value, ctx: &DriverContext) -> Result<Arc<SaltCloudDriver>> {
    let args: SaltCloudArgs = parse_args(NAME, args)?;
    let master_become = args.r#become.unwrap_or(false);

    let master = ctx.executors.create(
        ExecutorConfig::new(args.username.clone())
            .with_password(args.password.clone())
            .with_private_key_file(args.private_key_file.clone())
            .with_become(master_become, None)
            .with_serial(args.serial),
    );

    let slave_key = args
        .slave_private_key_file
        .or_else(|| args.private_key_file.clone());
    let jump = (!args.slave_direct_ssh).then(|| JumpHost {
        host: args.address.clone(),
        username: Some(args.username.clone()),
        private_key_file: args.private_key_file.clone(),
    });
    let cloud = ctx.executors.create(
        ExecutorConfig::new(args.slave_username.unwrap_or_else(|| args.username.clone()))
            .with_password(args.slave_password.or(args.password))
            .with_private_key_file(slave_key)
            .with_become(args.slave_become.unwrap_or(master_become), None)
            .with_jump(jump)
            .with_serial(args.serial),
    );

    Ok(Arc::new(SaltCloudDriver {
        address: args.address,
        slave_name_regexp: args.slave_name_regexp,
        get_ips_cmd: args.get_ips_cmd,
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

#[derive(Debug, Deserialize)]
struct Interface {
    #[serde(default)]
    hwaddr: Option<String>,
    #[serde(default)]
    inet: Vec<InetAddress>,
}

#[derive(Debug, Deserialize)]
struct InetAddress {
    address: String,
}

type MinionInterfaces = BTreeMap<String, BTreeMap<String, Interface>>;

/// Join the two salt answers into hosts; minions without an IP are skipped
fn join_hosts(interfaces: &MinionInterfaces, ips: &BTreeMap<String, Value>) -> Vec<Host> {
    let mut hosts = Vec::new();
    for (minion, ip) in ips {
        let Some(ip) = ip.as_str().filter(|ip| !ip.is_empty()) else {
            warn!("Minion {minion} has no address, skipping");
            continue;
        };
        let mac = interfaces.get(minion).and_then(|ifaces| {
            ifaces
                .values()
                .find(|iface| iface.inet.iter().any(|inet| inet.address == ip))
                .and_then(|iface| iface.hwaddr.clone())
        });
        let mut host = Host::new(ip).with_fqdn(minion);
        if let Some(mac) = mac {
            host = host.with_mac(mac);
        }
        hosts.push(host);
    }
    hosts
}

fn parse_salt_json<T: serde::de::DeserializeOwned>(stdout: &str, what: &str) -> Result<T> {
    serde_json::from_str(stdout)
        .map_err(|e| OsFaultsError::discovery(format!("Cannot parse salt {what} output: {e}")))
}

#[derive(Debug)]
pub struct SaltCloudDriver {
    address: String,
    slave_name_regexp: String,
    get_ips_cmd: String,
    master: Arc<dyn RemoteExecutor>,
    cloud: Arc<dyn RemoteExecutor>,
    hosts: OnceCell<Vec<Host>>,
}

impl SaltCloudDriver {
    fn salt(&self, function: &str) -> String {
        format!(
            "salt -E {} {function} --out=json --static",
            shell_quote(&self.slave_name_regexp)
        )
    }

    async fn discover(&self) -> Result<Vec<Host>> {
        let stdout = run_on_master(&self.master, &self.address, self.salt("network.interfaces")).await?;
        let interfaces: MinionInterfaces = parse_salt_json(&stdout, "network.interfaces")?;

        let stdout = run_on_master(&self.master, &self.address, self.salt(&self.get_ips_cmd)).await?;
        let ips: BTreeMap<String, Value> = parse_salt_json(&stdout, &self.get_ips_cmd)?;

        let hosts = join_hosts(&interfaces, &ips);
        debug!("Salt hosts: {hosts:?}");
        Ok(hosts)
    }
}

#[async_trait]
impl NodeDiscover for SaltCloudDriver {
    async fn discover_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.get_or_try_init(|| self.discover()).await?.clone())
    }
}

#[async_trait]
impl CloudManagementDriver for SaltCloudDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn node_kind(&self) -> &'static str {
        "SaltCloudNodeCollection"
    }

    fn cloud_executor(&self) -> Arc<dyn RemoteExecutor> {
        Arc::clone(&self.cloud)
    }

    fn services(&self) -> BTreeMap<String, DriverConf> {
        let salt = |service: &str, grep: &str| json!({"salt_service": service, "grep": grep});
        catalog(vec![
            ("keystone", "salt_service", salt("keystone", "keystone-all")),
            ("horizon", "salt_service", salt("apache2", "apache2")),
            ("memcached", "salt_service", salt("memcached", "memcached")),
            ("mysql", "salt_service", json!({
                "salt_service": "mysql",
                "grep": "mysqld",
                "port": ["tcp", 3307]
            })),
            ("rabbitmq", "salt_service", json!({
                "salt_service": "rabbitmq-server",
                "grep": "beam.smp .*rabbitmq_server",
                "port": ["tcp", 5672]
            })),
            ("glance-api", "salt_service", salt("glance-api", "glance-api")),
            ("glance-registry", "salt_service", salt("glance-registry", "glance-registry")),
            ("nova-api", "salt_service", salt("nova-api", "nova-api")),
            ("nova-compute", "salt_service", salt("nova-compute", "nova-compute")),
            ("nova-scheduler", "salt_service", salt("nova-scheduler", "nova-scheduler")),
            ("nova-conductor", "salt_service", salt("nova-conductor", "nova-conductor")),
            ("neutron-server", "salt_service", salt("neutron-server", "neutron-server")),
            ("neutron-dhcp-agent", "salt_service", salt("neutron-dhcp-agent", "neutron-dhcp-agent")),
            ("neutron-l3-agent", "salt_service", salt("neutron-l3-agent", "neutron-l3-agent")),
            ("heat-api", "salt_service", salt("heat-api", "heat-api")),
            ("heat-engine", "salt_service", salt("heat-engine", "heat-engine")),
            ("cinder-api", "salt_service", salt("cinder-api", "cinder-api")),
            ("cinder-volume", "salt_service", salt("cinder-volume", "cinder-volume")),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CloudManagement;
    use crate::executor::{Payload, Status, Task};
    use crate::test_support::RecordingExecutor;

    const INTERFACES: &str = r#"{
        "ctl01.mcp.local": {
            "lo": {"hwaddr": "00:00:00:00:00:00", "inet": [{"address": "127.0.0.1"}]},
            "ens3": {"hwaddr": "52:54:00:aa:00:01", "inet": [{"address": "10.0.0.11"}]}
        },
        "cmp01.mcp.local": {
            "ens3": {"hwaddr": "52:54:00:aa:00:02", "inet": [{"address": "10.0.0.21"}]}
        },
        "prx01.mcp.local": {
            "ens3": {"hwaddr": "52:54:00:aa:00:03", "inet": [{"address": "10.0.0.31"}]}
        }
    }"#;

    const IPS: &str = r#"{
        "ctl01.mcp.local": "10.0.0.11",
        "cmp01.mcp.local": "10.0.0.21",
        "prx01.mcp.local": ""
    }"#;

    fn salt_executor() -> RecordingExecutor {
        RecordingExecutor::new().with_responder(|_, task| match task {
            Task::Command(cmd) if cmd.contains("network.interfaces") => {
                (Status::Ok, Payload::stdout(INTERFACES))
            }
            Task::Command(cmd) if cmd.contains("pillar.get") => (Status::Ok, Payload::stdout(IPS)),
            _ => (Status::Ok, Payload::default()),
        })
    }

    fn connect(executor: &RecordingExecutor, args: Value) -> CloudManagement {
        spec().validate(&args).expect("valid args");
        let ctx = DriverContext::default().with_executors(Arc::new(executor.clone()));
        let parts = build(&args, &ctx).expect("built");
        let discover = parts.node_discover.expect("saltcloud discovers");
        CloudManagement::builder(parts.driver)
            .node_discover(discover)
            .build()
    }

    #[tokio::test]
    async fn hosts_join_interfaces_with_addresses() {
        let executor = salt_executor();
        let cloud = connect(&executor, json!({"address": "10.0.0.2", "username": "root"}));

        let nodes = cloud.get_nodes(None).await.expect("discovered");
        assert_eq!(nodes.get_ips(), vec!["10.0.0.11", "10.0.0.21"]);
        assert_eq!(nodes.get_macs(), vec!["52:54:00:aa:00:01", "52:54:00:aa:00:02"]);
        assert_eq!(nodes.get_fqdns(), vec!["ctl01.mcp.local", "cmp01.mcp.local"]);

        let calls = executor.calls();
        assert_eq!(
            calls[0].task,
            Task::command("salt -E '^(?!cfg|mon)' network.interfaces --out=json --static")
        );
        assert_eq!(calls[0].hosts, vec!["10.0.0.2"]);
    }

    #[tokio::test]
    async fn slave_credentials_fall_back_to_master() {
        let executor = salt_executor();
        connect(
            &executor,
            json!({
                "address": "10.0.0.2",
                "username": "ubuntu",
                "private_key_file": "/keys/salt",
                "become": true,
                "slave_password": "secret"
            }),
        );

        let configs = executor.configs();
        let slave = &configs[1];
        assert_eq!(slave.remote_user, "ubuntu");
        assert_eq!(slave.private_key_file.as_deref(), Some("/keys/salt"));
        assert_eq!(slave.password.as_deref(), Some("secret"));
        assert!(slave.r#become);
        assert_eq!(slave.jump.as_ref().map(|j| j.host.as_str()), Some("10.0.0.2"));
    }

    #[tokio::test]
    async fn explicit_slave_fields_win() {
        let executor = salt_executor();
        connect(
            &executor,
            json!({
                "address": "10.0.0.2",
                "username": "ubuntu",
                "become": true,
                "slave_username": "root",
                "slave_become": false,
                "slave_direct_ssh": true
            }),
        );

        let slave = &executor.configs()[1];
        assert_eq!(slave.remote_user, "root");
        assert!(!slave.r#become);
        assert!(slave.jump.is_none());
    }

    #[test]
    fn catalog_entries_build() {
        let executor = salt_executor();
        let cloud = connect(&executor, json!({"address": "10.0.0.2", "username": "root"}));
        for name in cloud.list_supported_services() {
            cloud.get_service(&name).expect("catalog args are valid");
        }
    }
}
