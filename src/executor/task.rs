// ============================================================================
// File: os-faults/src/executor/task.rs
// ----------------------------------------------------------------------------
// Task shapes understood by remote executors and their shell renderings.
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Linux signal numbers as seen on the target hosts
pub mod signal {
    pub const SIGKILL: i32 = 9;
    pub const SIGCONT: i32 = 18;
    pub const SIGSTOP: i32 = 19;
}

/// A unit of remote work
///
/// Serialises externally tagged, e.g. `{"command": "hostname"}` or
/// `{"kill": {"grep": "keystone", "sig": 9}}`. The set of shapes is the
/// stable contract between the core and executor implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Run a single command
    Command(String),
    /// Run a shell snippet
    Shell(String),
    /// Block or unblock a port for a service
    Iptables(IptablesTask),
    /// Send a signal to every process matching a pattern
    Kill(KillTask),
    /// Stop matching processes for a while, then continue them
    Freeze(FreezeTask),
    /// Drive an init-system service to a state
    Service(ServiceStateTask),
    /// Drive a docker container to a state
    DockerContainer(ContainerStateTask),
    /// Toggle a Fuel network bridge
    FuelNetworkMgmt(NetworkMgmtTask),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortAction {
    Block,
    Unblock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IptablesTask {
    pub protocol: String,
    pub port: u16,
    pub action: PortAction,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillTask {
    pub grep: String,
    pub sig: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeTask {
    pub grep: String,
    pub sec: u64,
}

/// Target lifecycle state for services and containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Started,
    Stopped,
    Restarted,
}

impl LifecycleState {
    /// Verb understood by `service` and `docker`
    pub fn verb(self) -> &'static str {
        match self {
            Self::Started => "start",
            Self::Stopped => "stop",
            Self::Restarted => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStateTask {
    pub name: String,
    pub state: LifecycleState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStateTask {
    pub name: String,
    pub state: LifecycleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkOperation {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMgmtTask {
    pub network_name: String,
    pub operation: LinkOperation,
}

impl Task {
    pub fn command<C: Into<String>>(command: C) -> Self {
        Self::Command(command.into())
    }

    pub fn shell<C: Into<String>>(script: C) -> Self {
        Self::Shell(script.into())
    }

    pub fn kill<G: Into<String>>(grep: G, sig: i32) -> Self {
        Self::Kill(KillTask {
            grep: grep.into(),
            sig,
        })
    }

    pub fn freeze<G: Into<String>>(grep: G, sec: u64) -> Self {
        Self::Freeze(FreezeTask {
            grep: grep.into(),
            sec,
        })
    }

    /// Render the task as a POSIX shell script for SSH-based executors
    pub fn to_shell(&self) -> String {
        match self {
            Self::Command(command) | Self::Shell(command) => command.clone(),
            Self::Iptables(t) => render_iptables(t),
            Self::Kill(t) => signal_matching(&t.grep, t.sig),
            Self::Freeze(t) => {
                // The helper is detached so the process is revived even if the
                // controller loses the connection.
                let helper = format!(
                    "{}; sleep {}; {}",
                    signal_matching(&t.grep, signal::SIGSTOP),
                    t.sec,
                    signal_matching(&t.grep, signal::SIGCONT)
                );
                format!(
                    "nohup sh -c {} > /dev/null 2>&1 < /dev/null &",
                    shell_quote(&helper)
                )
            }
            Self::Service(t) => format!("service {} {}", shell_quote(&t.name), t.state.verb()),
            Self::DockerContainer(t) => {
                format!("docker {} {}", t.state.verb(), shell_quote(&t.name))
            }
            Self::FuelNetworkMgmt(t) => {
                let operation = match t.operation {
                    LinkOperation::Up => "up",
                    LinkOperation::Down => "down",
                };
                format!("ip link set {} {}", fuel_bridge(&t.network_name), operation)
            }
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// Bridge carrying a Fuel network on every node
pub fn fuel_bridge(network_name: &str) -> String {
    match network_name {
        "management" => "br-mgmt".to_string(),
        "public" => "br-ex".to_string(),
        "private" => "br-prv".to_string(),
        "storage" => "br-storage".to_string(),
        other => format!("br-{other}"),
    }
}

/// Command that lists processes matching `pattern`, excluding grep itself
pub fn process_grep(pattern: &str) -> String {
    format!("ps ax | grep -v grep | grep {}", shell_quote(pattern))
}

fn signal_matching(pattern: &str, sig: i32) -> String {
    format!(
        "{} | awk '{{print $1}}' | xargs -r kill -{sig}",
        process_grep(pattern)
    )
}

fn render_iptables(task: &IptablesTask) -> String {
    let comment = shell_quote(&format!("{}_temporary_DROP", task.service));
    let rule = format!(
        "INPUT -p {} --dport {} -j DROP -m comment --comment {comment}",
        shell_quote(&task.protocol),
        task.port
    );
    match task.action {
        PortAction::Block => format!("iptables -I {}", rule.replacen("INPUT", "INPUT 1", 1)),
        PortAction::Unblock => {
            format!("while iptables -D {rule} 2>/dev/null; do :; done")
        }
    }
}

/// Quote a string for safe inclusion in a POSIX shell command line
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
