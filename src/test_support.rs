// ============================================================================
// File: os-faults/src/test_support.rs
// ----------------------------------------------------------------------------
// Unit test fixtures: a recording executor and a static cloud driver.
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::api::{CloudManagement, CloudManagementDriver, Host, NodeDiscover};
use crate::config::DriverConf;
use crate::error::Result;
use crate::executor::{
    ExecutorConfig, ExecutorFactory, Payload, RemoteExecutor, Status, Task, TaskRecord,
    apply_error_policy,
};

/// One `execute` call seen by [`RecordingExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub hosts: Vec<String>,
    pub task: Task,
}

type Responder = dyn Fn(&str, &Task) -> (Status, Payload) + Send + Sync;

/// Executor that records calls and answers from a responder
#[derive(Clone)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<Call>>>,
    configs: Arc<Mutex<Vec<ExecutorConfig>>>,
    responder: Arc<Responder>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            configs: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(|_: &str, _: &Task| (Status::Ok, Payload::stdout(""))),
        }
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &Task) -> (Status, Payload) + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Configurations passed through [`ExecutorFactory::create`]
    pub fn configs(&self) -> Vec<ExecutorConfig> {
        self.configs.lock().expect("configs lock").clone()
    }
}

impl fmt::Debug for RecordingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingExecutor")
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn execute(
        &self,
        hosts: &[Host],
        task: &Task,
        raise_on_statuses: &[Status],
    ) -> Result<Vec<TaskRecord>> {
        self.calls.lock().expect("calls lock").push(Call {
            hosts: hosts.iter().map(|h| h.ip.clone()).collect(),
            task: task.clone(),
        });
        let records = hosts
            .iter()
            .map(|host| {
                let (status, payload) = (self.responder)(&host.ip, task);
                TaskRecord::new(host.ip.clone(), status, task.clone(), payload)
            })
            .collect();
        apply_error_policy(records, raise_on_statuses)
    }
}

impl ExecutorFactory for RecordingExecutor {
    fn create(&self, config: ExecutorConfig) -> Arc<dyn RemoteExecutor> {
        self.configs.lock().expect("configs lock").push(config);
        Arc::new(self.clone())
    }
}

/// Cloud driver with a fixed executor and a one-entry service catalog
#[derive(Debug)]
pub struct StaticDriver {
    executor: RecordingExecutor,
}

impl StaticDriver {
    pub fn new(executor: RecordingExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl CloudManagementDriver for StaticDriver {
    fn name(&self) -> &'static str {
        "static"
    }

    fn node_kind(&self) -> &'static str {
        "StaticNodeCollection"
    }

    fn cloud_executor(&self) -> Arc<dyn RemoteExecutor> {
        Arc::new(self.executor.clone())
    }

    fn services(&self) -> BTreeMap<String, DriverConf> {
        BTreeMap::from([(
            "keystone".to_string(),
            DriverConf::new("process", json!({"grep": "keystone"})),
        )])
    }
}

#[derive(Debug)]
pub struct StaticDiscover {
    hosts: Vec<Host>,
}

#[async_trait]
impl NodeDiscover for StaticDiscover {
    async fn discover_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.clone())
    }
}

pub fn hosts(ips: &[&str]) -> Vec<Host> {
    ips.iter().map(|ip| Host::new(*ip)).collect()
}

/// Cloud whose discovery always returns `hosts`
pub fn cloud_with_hosts(executor: RecordingExecutor, hosts: Vec<Host>) -> CloudManagement {
    CloudManagement::builder(Arc::new(StaticDriver::new(executor)))
        .node_discover(Arc::new(StaticDiscover { hosts }))
        .build()
}
