// ============================================================================
// File: os-faults/src/drivers/services/flavors.rs
// ----------------------------------------------------------------------------
// Service driver flavors and their lifecycle commands
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{CloudManagement, Service};
use crate::error::{OsFaultsError, Result};
use crate::executor::{LifecycleState, ServiceStateTask, Task, shell_quote};
use crate::registry::{DriverSpec, parse_args};

use super::{CommonArgs, Discovery, LifecycleCommands, ProcessService, service_schema};

fn string() -> Value {
    json!({"type": "string"})
}

/// ProcessService with the shared args applied
fn assemble(
    name: &str,
    driver: &'static str,
    cloud: &CloudManagement,
    grep: String,
    commands: LifecycleCommands,
    common: CommonArgs,
) -> Arc<dyn Service> {
    Arc::new(
        ProcessService::new(name, driver, cloud, grep)
            .with_commands(commands)
            .with_port(common.port)
            .with_hosts(common.hosts),
    )
}

fn grep_or(common: &CommonArgs, fallback: &str) -> String {
    common.grep.clone().unwrap_or_else(|| fallback.to_string())
}

fn required_grep(driver: &str, common: &CommonArgs) -> Result<String> {
    common
        .grep
        .clone()
        .ok_or_else(|| OsFaultsError::config(format!("Driver '{driver}' requires 'grep'")))
}

fn shell_commands(restart: String, terminate: String, start: String) -> LifecycleCommands {
    LifecycleCommands {
        restart: Some(Task::shell(restart)),
        terminate: Some(Task::shell(terminate)),
        start: Some(Task::shell(start)),
    }
}

// ----------------------------------------------------------------------------
// process
// ----------------------------------------------------------------------------

const PROCESS: &str = "process";

fn process_schema() -> Value {
    service_schema(&[], &["grep"], true)
}

pub fn process_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_process),
        ..DriverSpec::new(PROCESS, "Service as process", process_schema)
    }
}

fn build_process(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let common: CommonArgs = parse_args(PROCESS, args)?;
    let grep = required_grep(PROCESS, &common)?;
    let commands = common.configured_commands();
    Ok(assemble(name, PROCESS, cloud, grep, commands, common))
}

// ----------------------------------------------------------------------------
// system_service
// ----------------------------------------------------------------------------

const SYSTEM_SERVICE: &str = "system_service";

#[derive(Debug, Deserialize)]
struct SystemServiceArgs {
    service_name: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn system_service_schema() -> Value {
    service_schema(&[("service_name", string())], &["service_name"], false)
}

pub fn system_service_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_system_service),
        ..DriverSpec::new(
            SYSTEM_SERVICE,
            "System service driven through the service state task",
            system_service_schema,
        )
    }
}

fn build_system_service(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let args: SystemServiceArgs = parse_args(SYSTEM_SERVICE, args)?;
    let state = |state| {
        Some(Task::Service(ServiceStateTask {
            name: args.service_name.clone(),
            state,
        }))
    };
    let commands = LifecycleCommands {
        restart: state(LifecycleState::Restarted),
        terminate: state(LifecycleState::Stopped),
        start: state(LifecycleState::Started),
    };
    let grep = grep_or(&args.common, &args.service_name);
    Ok(assemble(name, SYSTEM_SERVICE, cloud, grep, commands, args.common))
}

// ----------------------------------------------------------------------------
// linux_service
// ----------------------------------------------------------------------------

const LINUX_SERVICE: &str = "linux_service";

#[derive(Debug, Deserialize)]
struct LinuxServiceArgs {
    linux_service: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn linux_service_schema() -> Value {
    service_schema(&[("linux_service", string())], &["linux_service"], false)
}

pub fn linux_service_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_linux_service),
        ..DriverSpec::new(LINUX_SERVICE, "Linux init service", linux_service_schema)
    }
}

fn linux_commands(service: &str) -> LifecycleCommands {
    let service = shell_quote(service);
    shell_commands(
        format!("service {service} restart"),
        format!("service {service} stop"),
        format!("service {service} start"),
    )
}

fn build_linux_service(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let args: LinuxServiceArgs = parse_args(LINUX_SERVICE, args)?;
    let commands = linux_commands(&args.linux_service);
    let grep = grep_or(&args.common, &args.linux_service);
    Ok(assemble(name, LINUX_SERVICE, cloud, grep, commands, args.common))
}

// ----------------------------------------------------------------------------
// systemd_service
// ----------------------------------------------------------------------------

const SYSTEMD_SERVICE: &str = "systemd_service";

#[derive(Debug, Deserialize)]
struct SystemdServiceArgs {
    systemd_service: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn systemd_service_schema() -> Value {
    service_schema(&[("systemd_service", string())], &["systemd_service"], false)
}

pub fn systemd_service_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_systemd_service),
        ..DriverSpec::new(SYSTEMD_SERVICE, "Systemd unit", systemd_service_schema)
    }
}

fn build_systemd_service(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let args: SystemdServiceArgs = parse_args(SYSTEMD_SERVICE, args)?;
    let unit = shell_quote(&args.systemd_service);
    let commands = shell_commands(
        format!("systemctl restart {unit}"),
        format!("systemctl stop {unit}"),
        format!("systemctl start {unit}"),
    );
    let grep = grep_or(&args.common, &args.systemd_service);
    Ok(assemble(name, SYSTEMD_SERVICE, cloud, grep, commands, args.common))
}

// ----------------------------------------------------------------------------
// pcs_service
// ----------------------------------------------------------------------------

const PCS_SERVICE: &str = "pcs_service";

#[derive(Debug, Deserialize)]
struct PcsServiceArgs {
    pcs_service: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn pcs_service_schema() -> Value {
    service_schema(&[("pcs_service", string())], &["pcs_service", "grep"], false)
}

pub fn pcs_service_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_pcs_service),
        ..DriverSpec::new(PCS_SERVICE, "Pacemaker resource", pcs_service_schema)
    }
}

fn pcs_commands(resource: &str) -> LifecycleCommands {
    let resource = shell_quote(resource);
    shell_commands(
        format!("pcs resource restart {resource} $(hostname)"),
        format!("pcs resource ban {resource} $(hostname)"),
        format!("pcs resource clear {resource} $(hostname)"),
    )
}

fn build_pcs_service(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let args: PcsServiceArgs = parse_args(PCS_SERVICE, args)?;
    let grep = required_grep(PCS_SERVICE, &args.common)?;
    let commands = pcs_commands(&args.pcs_service);
    Ok(assemble(name, PCS_SERVICE, cloud, grep, commands, args.common))
}

// ----------------------------------------------------------------------------
// pcs_or_linux_service
// ----------------------------------------------------------------------------

const PCS_OR_LINUX_SERVICE: &str = "pcs_or_linux_service";

#[derive(Debug, Deserialize)]
struct PcsOrLinuxServiceArgs {
    pcs_service: String,
    linux_service: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn pcs_or_linux_service_schema() -> Value {
    service_schema(
        &[("pcs_service", string()), ("linux_service", string())],
        &["pcs_service", "linux_service", "grep"],
        false,
    )
}

pub fn pcs_or_linux_service_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_pcs_or_linux_service),
        ..DriverSpec::new(
            PCS_OR_LINUX_SERVICE,
            "Pacemaker resource when it exists, Linux service otherwise",
            pcs_or_linux_service_schema,
        )
    }
}

fn pcs_or_linux(resource: &str, pcs_verb: &str, service: &str, service_verb: &str) -> String {
    let resource = shell_quote(resource);
    format!(
        "if pcs resource show {resource}; then pcs resource {pcs_verb} {resource} $(hostname); \
         else service {} {service_verb}; fi",
        shell_quote(service)
    )
}

fn build_pcs_or_linux_service(
    name: &str,
    args: &Value,
    cloud: &CloudManagement,
) -> Result<Arc<dyn Service>> {
    let args: PcsOrLinuxServiceArgs = parse_args(PCS_OR_LINUX_SERVICE, args)?;
    let grep = required_grep(PCS_OR_LINUX_SERVICE, &args.common)?;
    let (pcs, linux) = (&args.pcs_service, &args.linux_service);
    let commands = shell_commands(
        pcs_or_linux(pcs, "restart", linux, "restart"),
        pcs_or_linux(pcs, "ban", linux, "stop"),
        pcs_or_linux(pcs, "clear", linux, "start"),
    );
    Ok(assemble(name, PCS_OR_LINUX_SERVICE, cloud, grep, commands, args.common))
}

// ----------------------------------------------------------------------------
// salt_service
// ----------------------------------------------------------------------------

const SALT_SERVICE: &str = "salt_service";

#[derive(Debug, Deserialize)]
struct SaltServiceArgs {
    salt_service: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn salt_service_schema() -> Value {
    service_schema(&[("salt_service", string())], &["salt_service", "grep"], false)
}

pub fn salt_service_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_salt_service),
        ..DriverSpec::new(SALT_SERVICE, "Service managed by SaltStack", salt_service_schema)
    }
}

fn build_salt_service(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let args: SaltServiceArgs = parse_args(SALT_SERVICE, args)?;
    let grep = required_grep(SALT_SERVICE, &args.common)?;
    let service = shell_quote(&args.salt_service);
    let commands = shell_commands(
        format!("salt-call service.restart {service}"),
        format!("salt-call service.stop {service}"),
        format!("salt-call service.start {service}"),
    );
    Ok(assemble(name, SALT_SERVICE, cloud, grep, commands, args.common))
}

// ----------------------------------------------------------------------------
// docker_process
// ----------------------------------------------------------------------------

const DOCKER_PROCESS: &str = "docker_process";

#[derive(Debug, Deserialize)]
struct DockerProcessArgs {
    container_name: String,
    #[serde(flatten)]
    common: CommonArgs,
}

fn docker_process_schema() -> Value {
    service_schema(&[("container_name", string())], &["container_name", "grep"], true)
}

pub fn docker_process_spec() -> DriverSpec {
    DriverSpec {
        service: Some(build_docker_process),
        ..DriverSpec::new(
            DOCKER_PROCESS,
            "Process running inside a docker container",
            docker_process_schema,
        )
    }
}

fn build_docker_process(name: &str, args: &Value, cloud: &CloudManagement) -> Result<Arc<dyn Service>> {
    let args: DockerProcessArgs = parse_args(DOCKER_PROCESS, args)?;
    let grep = required_grep(DOCKER_PROCESS, &args.common)?;
    let commands = args.common.configured_commands();
    let service = ProcessService::new(name, DOCKER_PROCESS, cloud, grep)
        .with_commands(commands)
        .with_port(args.common.port)
        .with_hosts(args.common.hosts)
        .with_discovery(Discovery::DockerTop {
            container: args.container_name,
        });
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Payload, Status};
    use crate::test_support::{RecordingExecutor, cloud_with_hosts, hosts};

    fn everywhere() -> (RecordingExecutor, CloudManagement) {
        let executor =
            RecordingExecutor::new().with_responder(|_, _| (Status::Ok, Payload::stdout("")));
        let cloud = cloud_with_hosts(executor.clone(), hosts(&["10.0.0.2"]));
        (executor, cloud)
    }

    async fn restart_task(spec: DriverSpec, args: Value) -> Task {
        let (executor, cloud) = everywhere();
        spec.validate(&args).expect("valid args");
        let build = spec.service.expect("service driver");
        let service = build("svc", &args, &cloud).expect("built");
        service.restart(None).await.expect("restart succeeds");
        executor.calls().pop().expect("restart issued").task
    }

    #[tokio::test]
    async fn linux_service_uses_service_command() {
        let task = restart_task(linux_service_spec(), json!({"linux_service": "apache2"})).await;
        assert_eq!(task, Task::shell("service 'apache2' restart"));
    }

    #[tokio::test]
    async fn systemd_service_uses_systemctl() {
        let task = restart_task(systemd_service_spec(), json!({"systemd_service": "nova-api"})).await;
        assert_eq!(task, Task::shell("systemctl restart 'nova-api'"));
    }

    #[tokio::test]
    async fn pcs_service_restarts_on_current_host() {
        let task = restart_task(
            pcs_service_spec(),
            json!({"pcs_service": "p_rabbitmq-server", "grep": "beam.smp"}),
        )
        .await;
        assert_eq!(
            task,
            Task::shell("pcs resource restart 'p_rabbitmq-server' $(hostname)")
        );
    }

    #[tokio::test]
    async fn pcs_or_linux_falls_back_to_service() {
        let task = restart_task(
            pcs_or_linux_service_spec(),
            json!({"pcs_service": "p_haproxy", "linux_service": "haproxy", "grep": "haproxy"}),
        )
        .await;
        assert_eq!(
            task,
            Task::shell(
                "if pcs resource show 'p_haproxy'; then pcs resource restart 'p_haproxy' $(hostname); \
                 else service 'haproxy' restart; fi"
            )
        );
    }

    #[tokio::test]
    async fn salt_service_uses_salt_call() {
        let task = restart_task(
            salt_service_spec(),
            json!({"salt_service": "keystone", "grep": "keystone-all"}),
        )
        .await;
        assert_eq!(task, Task::shell("salt-call service.restart 'keystone'"));
    }

    #[tokio::test]
    async fn system_service_uses_service_task() {
        let task = restart_task(system_service_spec(), json!({"service_name": "mysql"})).await;
        assert_eq!(
            task,
            Task::Service(ServiceStateTask {
                name: "mysql".to_string(),
                state: LifecycleState::Restarted,
            })
        );
    }

    #[tokio::test]
    async fn process_uses_configured_command() {
        let task = restart_task(
            process_spec(),
            json!({"grep": "my_app", "restart_cmd": "/usr/bin/my_app --restart"}),
        )
        .await;
        assert_eq!(task, Task::shell("/usr/bin/my_app --restart"));
    }

    #[test]
    fn fixed_command_flavors_reject_overrides() {
        let args = json!({"linux_service": "apache2", "restart_cmd": "reboot"});
        assert!(linux_service_spec().validate(&args).is_err());
        assert!(process_spec().validate(&json!({"restart_cmd": "x"})).is_err());
    }
}
