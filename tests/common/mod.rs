// ============================================================================
// File: os-faults/tests/common/mod.rs
// ----------------------------------------------------------------------------
// Shared fixtures for integration tests: an executor that records every
// task it is asked to run, plus in-memory hypervisor and BMC clients.
// ============================================================================

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use os_faults::drivers::power::{
    BmcClient, BmcCredentials, Domain, Hypervisor, HypervisorConnector, PowerResponse, PowerState,
};
use os_faults::executor::{
    ExecutorConfig, ExecutorFactory, Payload, RemoteExecutor, Status, Task, TaskRecord,
    apply_error_policy,
};
use os_faults::{CloudConfig, DriverContext, Host, OsFaultsError};

type Responder = dyn Fn(&str, &Task) -> (Status, Payload) + Send + Sync;

/// Executor double answering every host from a closure
#[derive(Clone)]
pub struct FakeExecutor {
    calls: Arc<Mutex<Vec<(Vec<String>, Task)>>>,
    responder: Arc<Responder>,
}

impl FakeExecutor {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Task) -> (Status, Payload) + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        }
    }

    pub fn ok() -> Self {
        Self::new(|_: &str, _: &Task| (Status::Ok, Payload::default()))
    }

    /// `(hosts, task)` for every call, in order
    pub fn calls(&self) -> Vec<(Vec<String>, Task)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn context(&self) -> DriverContext {
        DriverContext::default().with_executors(Arc::new(self.clone()))
    }
}

impl fmt::Debug for FakeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(
        &self,
        hosts: &[Host],
        task: &Task,
        raise_on_statuses: &[Status],
    ) -> Result<Vec<TaskRecord>, OsFaultsError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((hosts.iter().map(|h| h.ip.clone()).collect(), task.clone()));
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

impl ExecutorFactory for FakeExecutor {
    fn create(&self, _config: ExecutorConfig) -> Arc<dyn RemoteExecutor> {
        Arc::new(self.clone())
    }
}

/// Hypervisor double with fixed domains, recording the verbs it receives
#[derive(Debug, Default)]
pub struct FakeHypervisor {
    pub domains: Vec<Domain>,
    pub actions: Mutex<Vec<String>>,
}

impl FakeHypervisor {
    fn record(&self, action: &str, domain: &str) -> Result<(), OsFaultsError> {
        self.actions
            .lock()
            .expect("actions lock")
            .push(format!("{action} {domain}"));
        Ok(())
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().expect("actions lock").clone()
    }
}

impl Hypervisor for FakeHypervisor {
    fn list_domains(&self) -> Result<Vec<Domain>, OsFaultsError> {
        Ok(self.domains.clone())
    }

    fn destroy(&self, domain: &str) -> Result<(), OsFaultsError> {
        self.record("destroy", domain)
    }

    fn create(&self, domain: &str) -> Result<(), OsFaultsError> {
        self.record("create", domain)
    }

    fn reset(&self, domain: &str) -> Result<(), OsFaultsError> {
        self.record("reset", domain)
    }

    fn shutdown(&self, domain: &str) -> Result<(), OsFaultsError> {
        self.record("shutdown", domain)
    }

    fn suspend(&self, domain: &str) -> Result<(), OsFaultsError> {
        self.record("suspend", domain)
    }

    fn resume(&self, domain: &str) -> Result<(), OsFaultsError> {
        self.record("resume", domain)
    }

    fn is_active(&self, _domain: &str) -> Result<bool, OsFaultsError> {
        Ok(true)
    }

    fn snapshot_create(&self, domain: &str, snapshot_name: &str) -> Result<(), OsFaultsError> {
        self.record(&format!("snapshot-create {snapshot_name}"), domain)
    }

    fn snapshot_revert(&self, domain: &str, snapshot_name: &str) -> Result<(), OsFaultsError> {
        self.record(&format!("snapshot-revert {snapshot_name}"), domain)
    }
}

#[derive(Debug)]
pub struct FakeConnector(pub Arc<FakeHypervisor>);

impl HypervisorConnector for FakeConnector {
    fn connect(&self, _uri: &str) -> Result<Arc<dyn Hypervisor>, OsFaultsError> {
        Ok(self.0.clone())
    }
}

/// BMC double that always reaches the requested state
#[derive(Debug, Default)]
pub struct FakeBmc {
    pub requests: Mutex<Vec<(String, PowerState)>>,
}

impl BmcClient for FakeBmc {
    fn set_power(
        &self,
        bmc: &BmcCredentials,
        state: PowerState,
        _wait: bool,
    ) -> Result<PowerResponse, OsFaultsError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push((bmc.address.clone(), state));
        let powerstate = match state {
            PowerState::On => "on",
            _ => "off",
        };
        Ok(PowerResponse {
            powerstate: Some(powerstate.to_string()),
            error: None,
        })
    }
}

pub fn config(value: Value) -> CloudConfig {
    CloudConfig::from_value(value).expect("valid configuration")
}
