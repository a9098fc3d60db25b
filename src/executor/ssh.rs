// ============================================================================
// File: os-faults/src/executor/ssh.rs
// ----------------------------------------------------------------------------
// SSH fan-out executor: one blocking worker per host, bounded by `serial`.
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::api::Host;
use crate::error::Result;

use super::session::{HostSession, TransportError};
use super::{
    DEFAULT_FORKS, ExecutorConfig, ExecutorFactory, HostConnection, Payload, RemoteExecutor,
    Status, Task, TaskRecord, apply_error_policy, log_records,
};

/// Executor running tasks over SSH with `ssh2`
#[derive(Debug, Clone)]
pub struct SshExecutor {
    config: ExecutorConfig,
}

impl SshExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        hosts: &[Host],
        task: &Task,
        raise_on_statuses: &[Status],
    ) -> Result<Vec<TaskRecord>> {
        let ips: Vec<&str> = hosts.iter().map(|h| h.ip.as_str()).collect();
        debug!(
            "Executing task: {} on hosts: {:?} with serial: {:?}",
            task, ips, self.config.serial
        );

        let limit = Arc::new(Semaphore::new(
            self.config.serial.unwrap_or(DEFAULT_FORKS).max(1),
        ));
        let script = Arc::new(task.to_shell());
        let mut workers = JoinSet::new();

        for (index, host) in hosts.iter().enumerate() {
            let conn = self.config.connection_for(host);
            let limit = Arc::clone(&limit);
            let script = Arc::clone(&script);
            let task = task.clone();

            workers.spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                let address = conn.address.clone();
                let worker_task = task.clone();
                let record =
                    tokio::task::spawn_blocking(move || run_on_host(&conn, &script, worker_task))
                        .await
                        .unwrap_or_else(|e| {
                            TaskRecord::new(
                                address,
                                Status::Failed,
                                task,
                                Payload {
                                    msg: Some(format!("Worker panicked: {e}")),
                                    ..Payload::default()
                                },
                            )
                        });
                (index, record)
            });
        }

        let mut slots: Vec<Option<TaskRecord>> = vec![None; hosts.len()];
        while let Some(joined) = workers.join_next().await {
            if let Ok((index, record)) = joined {
                slots[index] = Some(record);
            }
        }

        let records: Vec<TaskRecord> = slots
            .into_iter()
            .zip(hosts)
            .map(|(slot, host)| {
                slot.unwrap_or_else(|| {
                    TaskRecord::new(
                        host.ip.clone(),
                        Status::Failed,
                        task.clone(),
                        Payload {
                            msg: Some("Worker was cancelled".to_string()),
                            ..Payload::default()
                        },
                    )
                })
            })
            .collect();

        log_records(&records);
        apply_error_policy(records, raise_on_statuses)
    }
}

fn run_on_host(conn: &HostConnection, script: &str, task: Task) -> TaskRecord {
    let outcome = HostSession::open(conn).and_then(|session| session.run(conn, script));

    match outcome {
        Ok(output) => {
            let status = if output.exit_status == 0 {
                Status::Ok
            } else {
                Status::Failed
            };
            TaskRecord::new(
                conn.address.clone(),
                status,
                task,
                Payload {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    rc: Some(output.exit_status),
                    msg: None,
                },
            )
        }
        Err(TransportError::Connect(msg)) => TaskRecord::new(
            conn.address.clone(),
            Status::Unreachable,
            task,
            Payload {
                msg: Some(msg),
                ..Payload::default()
            },
        ),
        Err(TransportError::Command(msg)) => TaskRecord::new(
            conn.address.clone(),
            Status::Failed,
            task,
            Payload {
                msg: Some(msg),
                ..Payload::default()
            },
        ),
    }
}

/// Factory producing [`SshExecutor`] instances
#[derive(Debug, Clone, Copy, Default)]
pub struct SshExecutorFactory;

impl ExecutorFactory for SshExecutorFactory {
    fn create(&self, config: ExecutorConfig) -> Arc<dyn RemoteExecutor> {
        Arc::new(SshExecutor::new(config))
    }
}
