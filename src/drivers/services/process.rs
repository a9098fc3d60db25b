// ============================================================================
// File: os-faults/src/drivers/services/process.rs
// ----------------------------------------------------------------------------
// ProcessService: the Service implementation behind every service driver.
//
// Flavors differ only in their lifecycle commands and discovery mode; the
// signal, freeze and iptables verbs are shared.
// ============================================================================

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::OnceCell;

use crate::api::{CloudManagement, NodeCollection, Service};
use crate::error::{OsFaultsError, Result};
use crate::executor::{IptablesTask, PortAction, Task, process_grep, shell_quote, signal};

/// How the hosts running a service are found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Process listing on every cloud node
    Process,
    /// Process listing inside a running docker container
    DockerTop { container: String },
}

impl Discovery {
    fn script(&self, grep: &str) -> String {
        match self {
            Self::Process => process_grep(grep),
            Self::DockerTop { container } => format!(
                "docker ps --format '{{{{.Names}}}}' | grep -qx {name} && \
                 docker top {name} | grep -v grep | grep -q -- {grep}",
                name = shell_quote(container),
                grep = shell_quote(grep)
            ),
        }
    }
}

/// Lifecycle commands; any of them may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleCommands {
    pub restart: Option<Task>,
    pub terminate: Option<Task>,
    pub start: Option<Task>,
}

/// Service identified by a process pattern
#[derive(Debug)]
pub struct ProcessService {
    name: String,
    driver: &'static str,
    cloud: CloudManagement,
    grep: String,
    commands: LifecycleCommands,
    port: Option<(String, u16)>,
    hosts: Option<Vec<String>>,
    discovery: Discovery,
    nodes: OnceCell<NodeCollection>,
}

impl ProcessService {
    pub fn new<N, G>(name: N, driver: &'static str, cloud: &CloudManagement, grep: G) -> Self
    where
        N: Into<String>,
        G: Into<String>,
    {
        Self {
            name: name.into(),
            driver,
            cloud: cloud.clone(),
            grep: grep.into(),
            commands: LifecycleCommands::default(),
            port: None,
            hosts: None,
            discovery: Discovery::Process,
            nodes: OnceCell::new(),
        }
    }

    pub fn with_commands(mut self, commands: LifecycleCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_port(mut self, port: Option<(String, u16)>) -> Self {
        self.port = port;
        self
    }

    /// Restrict the service to these IPs instead of discovering it
    pub fn with_hosts(mut self, hosts: Option<Vec<String>>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn driver(&self) -> &'static str {
        self.driver
    }

    pub fn grep(&self) -> &str {
        &self.grep
    }

    pub fn commands(&self) -> &LifecycleCommands {
        &self.commands
    }

    async fn discover(&self) -> Result<NodeCollection> {
        let all_nodes = self.cloud.get_nodes(None).await?;

        if let Some(ips) = &self.hosts {
            return Ok(all_nodes.retain(|host| ips.contains(&host.ip)));
        }

        let task = Task::shell(self.discovery.script(&self.grep));
        let records = self
            .cloud
            .execute_on_cloud(&all_nodes.hosts(), &task, false)
            .await?;
        let found: Vec<&str> = records
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| r.host.as_str())
            .collect();
        debug!("Service {} is found on: {found:?}", self.name);

        Ok(all_nodes.retain(|host| found.contains(&host.ip.as_str())))
    }

    /// Explicit nodes or the discovered ones; never empty
    async fn target_nodes(&self, nodes: Option<&NodeCollection>) -> Result<NodeCollection> {
        let nodes = match nodes {
            Some(nodes) => nodes.clone(),
            None => self.nodes.get_or_try_init(|| self.discover()).await?.clone(),
        };
        if nodes.is_empty() {
            return Err(OsFaultsError::service(format!(
                "Service {} is not found on any nodes",
                self.name
            )));
        }
        Ok(nodes)
    }

    fn required<'a>(&self, command: &'a Option<Task>, variable: &str) -> Result<&'a Task> {
        command
            .as_ref()
            .ok_or_else(|| OsFaultsError::required_variable(format!("Service {}", self.name), variable))
    }

    fn required_port(&self) -> Result<&(String, u16)> {
        self.port
            .as_ref()
            .ok_or_else(|| OsFaultsError::required_variable(format!("Service {}", self.name), "port"))
    }

    async fn run(&self, nodes: Option<&NodeCollection>, action: &str, task: &Task) -> Result<()> {
        let nodes = self.target_nodes(nodes).await?;
        info!("{action} {} service on nodes: {:?}", self.name, nodes.get_ips());
        nodes.run_task(task, true).await.map(|_| ())
    }

    fn iptables(&self, action: PortAction) -> Result<Task> {
        let (protocol, port) = self.required_port()?;
        Ok(Task::Iptables(IptablesTask {
            protocol: protocol.clone(),
            port: *port,
            action,
            service: self.name.clone(),
        }))
    }
}

#[async_trait]
impl Service for ProcessService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_nodes(&self) -> Result<NodeCollection> {
        Ok(self.nodes.get_or_try_init(|| self.discover()).await?.clone())
    }

    async fn restart(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = self.required(&self.commands.restart, "restart_cmd")?;
        self.run(nodes, "Restart", task).await
    }

    async fn terminate(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = self.required(&self.commands.terminate, "terminate_cmd")?;
        self.run(nodes, "Terminate", task).await
    }

    async fn start(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = self.required(&self.commands.start, "start_cmd")?;
        self.run(nodes, "Start", task).await
    }

    async fn kill(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = Task::kill(self.grep.clone(), signal::SIGKILL);
        self.run(nodes, "Kill", &task).await
    }

    async fn freeze(&self, nodes: Option<&NodeCollection>, sec: Option<u64>) -> Result<()> {
        let task = match sec {
            Some(sec) => Task::freeze(self.grep.clone(), sec),
            None => Task::kill(self.grep.clone(), signal::SIGSTOP),
        };
        self.run(nodes, "Freeze", &task).await
    }

    async fn unfreeze(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = Task::kill(self.grep.clone(), signal::SIGCONT);
        self.run(nodes, "Unfreeze", &task).await
    }

    async fn plug(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = self.iptables(PortAction::Unblock)?;
        self.run(nodes, "Plug", &task).await
    }

    async fn unplug(&self, nodes: Option<&NodeCollection>) -> Result<()> {
        let task = self.iptables(PortAction::Block)?;
        self.run(nodes, "Unplug", &task).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::executor::{Payload, Status};
    use crate::test_support::{RecordingExecutor, cloud_with_hosts, hosts};

    /// Executor where process discovery succeeds only on `present`
    fn present_on(present: &'static [&'static str]) -> RecordingExecutor {
        RecordingExecutor::new().with_responder(move |host, task| match task {
            Task::Shell(script) if script.starts_with("ps ax") || script.starts_with("docker ps") => {
                if present.contains(&host) {
                    (Status::Ok, Payload::stdout("1234 keystone"))
                } else {
                    (Status::Failed, Payload::default())
                }
            }
            _ => (Status::Ok, Payload::default()),
        })
    }

    fn keystone(executor: &RecordingExecutor) -> ProcessService {
        let cloud = cloud_with_hosts(executor.clone(), hosts(&["10.0.0.2", "10.0.0.3"]));
        ProcessService::new("keystone", "process", &cloud, "keystone")
    }

    #[tokio::test]
    async fn kill_targets_only_discovered_hosts() {
        let executor = present_on(&["10.0.0.3"]);
        let service = keystone(&executor);

        service.kill(None).await.expect("kill succeeds");

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].task, Task::shell("ps ax | grep -v grep | grep 'keystone'"));
        assert_eq!(calls[0].hosts, vec!["10.0.0.2", "10.0.0.3"]);
        assert_eq!(calls[1].task, Task::kill("keystone", 9));
        assert_eq!(calls[1].hosts, vec!["10.0.0.3"]);
    }

    #[tokio::test]
    async fn discovery_is_cached() {
        let executor = present_on(&["10.0.0.2"]);
        let service = keystone(&executor);

        service.get_nodes().await.expect("discovered");
        service.unfreeze(None).await.expect("unfreeze succeeds");
        service.freeze(None, None).await.expect("freeze succeeds");

        let tasks: Vec<Task> = executor.calls().into_iter().map(|c| c.task).collect();
        assert_eq!(
            tasks[1..],
            [Task::kill("keystone", signal::SIGCONT), Task::kill("keystone", signal::SIGSTOP)]
        );
    }

    #[tokio::test]
    async fn freeze_with_duration_uses_helper() {
        let executor = present_on(&["10.0.0.2"]);
        let service = keystone(&executor);

        service.freeze(None, Some(10)).await.expect("freeze succeeds");

        let calls = executor.calls();
        assert_eq!(calls[1].task, Task::freeze("keystone", 10));
    }

    #[tokio::test]
    async fn absent_service_is_an_error() {
        let executor = present_on(&[]);
        let service = keystone(&executor);

        let err = service.kill(None).await.unwrap_err();
        assert_eq!(err.to_string(), "Service keystone is not found on any nodes");
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_command_fails_before_discovery() {
        let executor = present_on(&["10.0.0.2"]);
        let service = keystone(&executor);

        let err = service.restart(None).await.unwrap_err();
        assert!(matches!(err, OsFaultsError::RequiredVariableMissing { ref variable, .. } if variable == "restart_cmd"));
        assert!(executor.calls().is_empty());

        let err = service.unplug(None).await.unwrap_err();
        assert!(matches!(err, OsFaultsError::RequiredVariableMissing { ref variable, .. } if variable == "port"));
    }

    #[tokio::test]
    async fn explicit_nodes_bypass_discovery() {
        let executor = present_on(&[]);
        let cloud = cloud_with_hosts(executor.clone(), hosts(&["10.0.0.2", "10.0.0.3"]));
        let service = ProcessService::new("keystone", "process", &cloud, "keystone")
            .with_commands(LifecycleCommands {
                restart: Some(Task::shell("service keystone restart")),
                ..LifecycleCommands::default()
            })
            .with_port(Some(("tcp".to_string(), 5000)));
        let nodes = NodeCollection::new(&cloud, hosts(&["10.0.0.3"]));

        service.restart(Some(&nodes)).await.expect("restart succeeds");
        service.unplug(Some(&nodes)).await.expect("unplug succeeds");

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].task, Task::shell("service keystone restart"));
        assert_eq!(
            calls[1].task,
            Task::Iptables(IptablesTask {
                protocol: "tcp".to_string(),
                port: 5000,
                action: PortAction::Block,
                service: "keystone".to_string(),
            })
        );
        assert!(calls.iter().all(|c| c.hosts == vec!["10.0.0.3"]));
    }

    #[tokio::test]
    async fn configured_hosts_skip_process_listing() {
        let executor = present_on(&[]);
        let cloud = cloud_with_hosts(executor.clone(), hosts(&["10.0.0.2", "10.0.0.3"]));
        let service = ProcessService::new("mysql", "process", &cloud, "mysqld")
            .with_hosts(Some(vec!["10.0.0.2".to_string()]));

        let nodes = service.get_nodes().await.expect("filtered by ip");
        assert_eq!(nodes.get_ips(), vec!["10.0.0.2"]);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn docker_top_discovery_checks_container() {
        let executor = present_on(&["10.0.0.3"]);
        let cloud = cloud_with_hosts(executor.clone(), hosts(&["10.0.0.2", "10.0.0.3"]));
        let service = ProcessService::new("nova-api", "docker_process", &cloud, "nova-api")
            .with_discovery(Discovery::DockerTop {
                container: "nova_api".to_string(),
            });

        let nodes = service.get_nodes().await.expect("discovered");
        assert_eq!(nodes.get_ips(), vec!["10.0.0.3"]);

        let Task::Shell(script) = &executor.calls()[0].task else {
            panic!("discovery runs a shell task");
        };
        assert!(script.contains("docker top 'nova_api'"));
        assert!(script.starts_with("docker ps --format '{{.Names}}'"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_discovery() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let executor = RecordingExecutor::new().with_responder(move |_, task| {
            if matches!(task, Task::Shell(_)) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            (Status::Ok, Payload::default())
        });
        let service = keystone(&executor);

        let (a, b) = tokio::join!(service.get_nodes(), service.get_nodes());
        assert_eq!(a.expect("discovered"), b.expect("discovered"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
