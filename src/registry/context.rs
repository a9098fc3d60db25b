// ============================================================================
// File: os-faults/src/registry/context.rs
// ----------------------------------------------------------------------------
// External collaborators handed to driver constructors
// ============================================================================

use std::sync::Arc;

use crate::drivers::power::{BmcClient, HypervisorConnector, IpmitoolClient, VirshConnector};
use crate::executor::{ExecutorFactory, SshExecutorFactory};

/// Remote executor, hypervisor and BMC clients used by drivers
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub executors: Arc<dyn ExecutorFactory>,
    pub hypervisors: Arc<dyn HypervisorConnector>,
    pub bmc: Arc<dyn BmcClient>,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            executors: Arc::new(SshExecutorFactory),
            hypervisors: Arc::new(VirshConnector),
            bmc: Arc::new(IpmitoolClient::default()),
        }
    }
}

impl DriverContext {
    pub fn with_executors(mut self, executors: Arc<dyn ExecutorFactory>) -> Self {
        self.executors = executors;
        self
    }

    pub fn with_hypervisors(mut self, hypervisors: Arc<dyn HypervisorConnector>) -> Self {
        self.hypervisors = hypervisors;
        self
    }

    pub fn with_bmc(mut self, bmc: Arc<dyn BmcClient>) -> Self {
        self.bmc = bmc;
        self
    }
}
