// ============================================================================
// File: os-faults/src/drivers/discover/node_list.rs
// ----------------------------------------------------------------------------
// `node_list` discover: hosts listed directly in the configuration
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::api::{Host, NodeDiscover};
use crate::drivers::common::host_schema;
use crate::error::Result;
use crate::registry::{DriverContext, DriverSpec, parse_args};

pub const NAME: &str = "node_list";

fn config_schema() -> Value {
    json!({
        "type": "array",
        "items": host_schema(),
        "minItems": 1
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        node_discover: Some(build),
        ..DriverSpec::new(NAME, "Reads hosts from configuration file", config_schema)
    }
}

fn build(args: &Value, _ctx: &DriverContext) -> Result<Arc<dyn NodeDiscover>> {
    let hosts: Vec<Host> = parse_args(NAME, args)?;
    Ok(Arc::new(NodeListDiscover::new(hosts)))
}

/// Returns the configured hosts
#[derive(Debug, Clone)]
pub struct NodeListDiscover {
    hosts: Vec<Host>,
}

impl NodeListDiscover {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl NodeDiscover for NodeListDiscover {
    async fn discover_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConf;
    use crate::registry::Registry;

    #[tokio::test]
    async fn hosts_come_back_as_configured() {
        let conf = DriverConf::new(
            NAME,
            json!([
                {"ip": "10.0.0.51", "mac": "aa:bb:cc:dd:ee:01", "fqdn": "node1.local"},
                {"ip": "10.0.0.52", "auth": {"username": "ubuntu", "jump": {"host": "10.0.0.1"}}}
            ]),
        );
        let discover = Registry::global()
            .expect("registry")
            .build_node_discover(&conf, &DriverContext::default())
            .expect("valid args");

        let hosts = discover.discover_hosts().await.expect("static list");
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:01"));
        let auth = hosts[1].auth.as_ref().expect("auth parsed");
        assert_eq!(auth.username.as_deref(), Some("ubuntu"));
        assert_eq!(auth.jump.as_ref().map(|j| j.host.as_str()), Some("10.0.0.1"));
    }

    #[test]
    fn empty_or_malformed_lists_are_rejected() {
        let spec = spec();
        assert!(spec.validate(&json!([])).is_err());
        assert!(spec.validate(&json!([{"fqdn": "node1.local"}])).is_err());
        assert!(spec.validate(&json!([{"ip": "10.0.0.1", "mac": "nope"}])).is_err());
        assert!(spec.validate(&json!([{"ip": "10.0.0.1"}])).is_ok());
    }
}
