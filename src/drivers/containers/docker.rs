// ============================================================================
// File: os-faults/src/drivers/containers/docker.rs
// ----------------------------------------------------------------------------
// `docker_container` driver
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::api::{CloudManagement, Container, NodeCollection};
use crate::error::{OsFaultsError, Result};
use crate::executor::{ContainerStateTask, LifecycleState, Task, shell_quote};
use crate::registry::{DriverSpec, parse_args};

pub const NAME: &str = "docker_container";

#[derive(Debug, Deserialize)]
struct DockerContainerArgs {
    container_name: String,
    #[serde(default)]
    hosts: Option<Vec<String>>,
}

fn config_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "container_name": {"type": "string"},
            "hosts": {"type": "array", "items": {"type": "string"}, "minItems": 1}
        },
        "required": ["container_name"],
        "additionalProperties": false
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        container: Some(build),
        ..DriverSpec::new(NAME, "Docker container", config_schema)
    }
}

fn build(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Container>> {
    let args: DockerContainerArgs = parse_args(NAME, args)?;
    Ok(Arc::new(
        DockerContainer::new(name, cloud, args.container_name).with_hosts(args.hosts),
    ))
}

/// Container found with `docker ps` and driven with `docker start|stop|restart`
#[derive(Debug)]
pub struct DockerContainer {
    name: String,
    container_name: String,
    cloud: CloudManagement,
    hosts: Option<Vec<String>>,
    nodes: OnceCell<NodeCollection>,
}

impl DockerContainer {
    pub fn new<N: Into<String>, C: Into<String>>(name: N, cloud: &CloudManagement, container_name: C) -> Self {
        Self {
            name: name.into(),
            container_name: container_name.into(),
            cloud: cloud.clone(),
            hosts: None,
            nodes: OnceCell::new(),
        }
    }

    pub fn with_hosts(mut self, hosts: Option<Vec<String>>) -> Self {
        self.hosts = hosts;
        self
    }

    fn discovery_script(&self) -> String {
        let name = shell_quote(&self.container_name);
        format!(
            "docker ps --filter name=^{name}$ --format '{{{{.Names}}}}' | grep -x {name}"
        )
    }

    async fn discover(&self) -> Result<NodeCollection> {
        let all_nodes = self.cloud.get_nodes(None).await?;

        if let Some(ips) = &self.hosts {
            return Ok(all_nodes.retain(|host| ips.contains(&host.ip)));
        }

        let task = Task::shell(self.discovery_script());
        let records = self
            .cloud
            .execute_on_cloud(&all_nodes.hosts(), &task, false)
            .await?;
        let found: Vec<&str> = records
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| r.host.as_str())
            .collect();
        debug!("Container {} is found on: {found:?}", self.name);

        Ok(all_nodes.retain(|host| found.contains(&host.ip.as_str())))
    }

    async fn run(&self, nodes: Option<&NodeCollection>, state: LifecycleState) -> Result<()> {
        let nodes = match nodes {
            Some(nodes) => nodes.clone(),
            None => self.nodes.get_or_try_init(|| self.discover()).await?.clone(),
        };
        if nodes.is_empty() {
            return Err(OsFaultsError::container(format!(
                "Container {} is not found on any nodes",
                self.name
            )));
        }

        info!(
            "{} container {} on nodes: {:?}",
            state.verb(),
            self.name,
            nodes.get_ips()
        );
        let task = Task::DockerContainer(ContainerStateTask {
            name: self.container_name.clone(),
            state,
        });
        nodes.run_task(&task, true).await.map(|_| ())
    }
}

#[async_trait]
impl Container for DockerContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_nodes(&self) -> Result<NodeCollection> {
        Ok(self.nodes.get_or_try_init(|| self.discover()).await?.clone())
    }

    async fn restart(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        self.run(nodes, LifecycleState::Restarted).await
    }

    async fn terminate(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        self.run(nodes, LifecycleState::Stopped).await
    }

    async fn start(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        self.run(nodes, LifecycleState::Started).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Payload, Status};
    use crate::test_support::{RecordingExecutor, cloud_with_hosts, hosts};

    fn running_on(present: &'static [&'static str]) -> RecordingExecutor {
        RecordingExecutor::new().with_responder(move |host, task| match task {
            Task::Shell(_) if !present.contains(&host) => (Status::Failed, Payload::default()),
            _ => (Status::Ok, Payload::stdout("neutron_api")),
        })
    }

    #[tokio::test]
    async fn terminate_stops_container_where_it_runs() {
        let executor = running_on(&["10.0.0.2"]);
        let cloud = cloud_with_hosts(executor.clone(), hosts(&["10.0.0.2", "10.0.0.3"]));
        let container = DockerContainer::new("neutron-api", &cloud, "neutron_api");

        container.terminate(None).await.expect("terminate succeeds");

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].task,
            Task::shell("docker ps --filter name=^'neutron_api'$ --format '{{.Names}}' | grep -x 'neutron_api'")
        );
        assert_eq!(
            calls[1].task,
            Task::DockerContainer(ContainerStateTask {
                name: "neutron_api".to_string(),
                state: LifecycleState::Stopped,
            })
        );
        assert_eq!(calls[1].hosts, vec!["10.0.0.2"]);
    }

    #[tokio::test]
    async fn missing_container_is_an_error() {
        let executor = running_on(&[]);
        let cloud = cloud_with_hosts(executor, hosts(&["10.0.0.2"]));
        let container = DockerContainer::new("neutron-api", &cloud, "neutron_api");

        let err = container.start(None).await.unwrap_err();
        assert!(matches!(err, OsFaultsError::Container { .. }));
    }

    #[tokio::test]
    async fn registry_builds_container_from_args() {
        let executor = running_on(&["10.0.0.3"]);
        let cloud = cloud_with_hosts(executor, hosts(&["10.0.0.2", "10.0.0.3"]));
        let registry = crate::registry::Registry::global().expect("registry");
        let conf = crate::config::DriverConf::new(NAME, json!({"container_name": "nova_api"}));

        let container = registry
            .build_container("nova-api", &conf, &cloud)
            .expect("valid args");
        assert_eq!(container.name(), "nova-api");
        assert_eq!(container.get_nodes().await.expect("discovered").get_ips(), vec!["10.0.0.3"]);
    }
}
