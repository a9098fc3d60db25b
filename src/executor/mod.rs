// ============================================================================
// File: os-faults/src/executor/mod.rs
// ----------------------------------------------------------------------------
// Remote executor contract consumed by the core.
//
// An executor fans a single task out to N hosts and returns one record per
// host. The error policy (raise on selected statuses, distinguishing
// unreachable-only failures) and the truncated debug logging live here so
// every implementation behaves identically.
// ============================================================================

mod session;
mod ssh;
mod task;
mod tunnel;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::api::{Host, JumpHost};
use crate::error::{OsFaultsError, Result};

pub use ssh::{SshExecutor, SshExecutorFactory};
pub use task::{
    ContainerStateTask, FreezeTask, IptablesTask, KillTask, LifecycleState, LinkOperation,
    NetworkMgmtTask, PortAction, ServiceStateTask, Task, fuel_bridge, process_grep, shell_quote,
    signal,
};

/// Longest stdout written to debug logs
pub const STDOUT_LIMIT: usize = 4096;

/// Parallelism used when no `serial` is configured
pub const DEFAULT_FORKS: usize = 100;

/// Statuses that raise unless the caller opts out
pub const DEFAULT_ERROR_STATUSES: &[Status] = &[Status::Failed, Status::Unreachable];

/// Per-host outcome of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Failed,
    Unreachable,
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Failed => "FAILED",
            Self::Unreachable => "UNREACHABLE",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(name)
    }
}

/// Output captured from a host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub stdout: String,

    #[serde(default)]
    pub stderr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,

    /// Transport-level message (connection errors and the like)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Payload {
    pub fn stdout<S: Into<String>>(stdout: S) -> Self {
        Self {
            stdout: stdout.into(),
            rc: Some(0),
            ..Self::default()
        }
    }
}

/// One host's result for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Host address the task ran on
    pub host: String,
    pub status: Status,
    pub task: Task,
    pub payload: Payload,
}

impl TaskRecord {
    pub fn new<H: Into<String>>(host: H, status: Status, task: Task, payload: Payload) -> Self {
        Self {
            host: host.into(),
            status,
            task,
            payload,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.host,
            self.status,
            truncate_stdout(&self.payload.stdout)
        )?;
        if let Some(msg) = &self.payload.msg {
            write!(f, " [{msg}]")?;
        }
        Ok(())
    }
}

/// Connection settings an executor applies to every host
///
/// Fields on [`crate::api::HostAuth`] override these per host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub remote_user: String,
    pub password: Option<String>,
    pub private_key_file: Option<String>,
    pub r#become: bool,
    pub become_password: Option<String>,
    pub become_method: String,
    pub jump: Option<JumpHost>,
    pub port: u16,
    /// Maximum hosts worked on at once
    pub serial: Option<usize>,
    pub connect_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            remote_user: "root".to_string(),
            password: None,
            private_key_file: None,
            r#become: false,
            become_password: None,
            become_method: "sudo".to_string(),
            jump: None,
            port: 22,
            serial: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ExecutorConfig {
    pub fn new<U: Into<String>>(remote_user: U) -> Self {
        Self {
            remote_user: remote_user.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    pub fn with_private_key_file(mut self, key: Option<String>) -> Self {
        self.private_key_file = key;
        self
    }

    pub fn with_become(mut self, enabled: bool, password: Option<String>) -> Self {
        self.r#become = enabled;
        self.become_password = password;
        self
    }

    /// Override the privilege escalation method; `None` keeps the current one
    pub fn with_become_method(mut self, method: Option<String>) -> Self {
        if let Some(method) = method {
            self.become_method = method;
        }
        self
    }

    pub fn with_jump(mut self, jump: Option<JumpHost>) -> Self {
        self.jump = jump;
        self
    }

    pub fn with_serial(mut self, serial: Option<usize>) -> Self {
        self.serial = serial;
        self
    }

    /// Resolve the effective connection parameters for one host
    pub fn connection_for(&self, host: &Host) -> HostConnection {
        let auth = host.auth.clone().unwrap_or_default();
        HostConnection {
            address: host.ip.clone(),
            port: self.port,
            username: auth.username.unwrap_or_else(|| self.remote_user.clone()),
            password: auth.password.or_else(|| self.password.clone()),
            private_key_file: auth
                .private_key_file
                .or_else(|| self.private_key_file.clone()),
            r#become: auth.r#become.unwrap_or(self.r#become),
            become_password: auth
                .become_password
                .or_else(|| self.become_password.clone()),
            become_method: auth
                .become_method
                .unwrap_or_else(|| self.become_method.clone()),
            jump: auth.jump.or_else(|| self.jump.clone()),
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Fully resolved per-host connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConnection {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key_file: Option<String>,
    pub r#become: bool,
    pub become_password: Option<String>,
    pub become_method: String,
    pub jump: Option<JumpHost>,
    pub connect_timeout: Duration,
}

/// Fans one task out to many hosts
#[async_trait]
pub trait RemoteExecutor: Send + Sync + fmt::Debug {
    /// Run `task` on every host
    ///
    /// # Arguments
    /// * `hosts` - Target hosts
    /// * `task` - Task to run
    /// * `raise_on_statuses` - Statuses that turn the call into an error
    ///
    /// # Returns
    /// Exactly one record per host, unless the error policy raises
    async fn execute(
        &self,
        hosts: &[Host],
        task: &Task,
        raise_on_statuses: &[Status],
    ) -> Result<Vec<TaskRecord>>;
}

/// Builds executors for drivers from typed connection settings
pub trait ExecutorFactory: Send + Sync + fmt::Debug {
    fn create(&self, config: ExecutorConfig) -> Arc<dyn RemoteExecutor>;
}

/// Debug-log records with large stdout truncated
pub fn log_records(records: &[TaskRecord]) {
    debug!("Execution completed with {} result(s):", records.len());
    for record in records {
        debug!("{record}");
    }
}

/// Apply the executor error policy to a finished batch
///
/// # Returns
/// The records unchanged, or `Unreachable` when every failing record is
/// unreachable, or `Execution` otherwise.
pub fn apply_error_policy(
    records: Vec<TaskRecord>,
    raise_on_statuses: &[Status],
) -> Result<Vec<TaskRecord>> {
    if raise_on_statuses.is_empty() {
        return Ok(records);
    }

    let failed: Vec<TaskRecord> = records
        .iter()
        .filter(|r| raise_on_statuses.contains(&r.status))
        .cloned()
        .collect();

    if failed.is_empty() {
        return Ok(records);
    }

    let message = failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    error!("Execution failed: {message}");

    if failed.iter().all(|r| r.status == Status::Unreachable) {
        Err(OsFaultsError::Unreachable {
            message,
            records: failed,
        })
    } else {
        Err(OsFaultsError::Execution {
            message,
            records: failed,
        })
    }
}

fn truncate_stdout(stdout: &str) -> Cow<'_, str> {
    if stdout.len() <= STDOUT_LIMIT {
        return Cow::Borrowed(stdout);
    }
    let mut cut = STDOUT_LIMIT;
    while !stdout.is_char_boundary(cut) {
        cut -= 1;
    }
    Cow::Owned(format!("{}... <cut>", &stdout[..cut]))
}
