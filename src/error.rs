// ============================================================================
// File: os-faults/src/error.rs
// ----------------------------------------------------------------------------
// Error taxonomy shared by drivers, the executor façade and the public API.
// ============================================================================

use crate::executor::TaskRecord;

/// Errors raised by the fault-injection core
///
/// The enum is `Clone` so that the process-wide driver registry can hand out
/// its initialisation failure to every caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OsFaultsError {
    /// No driver registered under the requested name
    #[error("Driver '{name}' does not exist.")]
    DriverNotFound { name: String },

    /// Two drivers share the same name
    #[error("Driver with name '{name}' already exists.")]
    DriverWithSuchNameExists { name: String },

    /// Invalid or unreadable configuration
    #[error("{message}")]
    Config { message: String },

    /// Node discovery produced nothing usable
    #[error("Discovery failed: {message}")]
    Discovery { message: String },

    /// At least one host reported a failing status
    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        records: Vec<TaskRecord>,
    },

    /// Every failing host was unreachable
    #[error("Hosts are unreachable: {message}")]
    Unreachable {
        message: String,
        records: Vec<TaskRecord>,
    },

    /// Power dispatch or a power driver failed
    #[error("{message}")]
    PowerManagement { message: String },

    /// Service lookup or action failed
    #[error("{message}")]
    Service { message: String },

    /// Container lookup or action failed
    #[error("{message}")]
    Container { message: String },

    /// Node collection algebra or selection failed
    #[error("{message}")]
    NodeCollection { message: String },

    /// A lifecycle command was invoked without being configured
    #[error("{owner} does not have required variable '{variable}' defined")]
    RequiredVariableMissing { owner: String, variable: String },

    /// The driver does not implement the requested verb
    #[error("{operation} is not supported by driver '{driver}'")]
    Unsupported { driver: String, operation: String },

    /// Human API command did not match any known pattern
    #[error("{message}")]
    Parse { message: String },
}

impl OsFaultsError {
    /// Create a configuration error
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery<M: Into<String>>(message: M) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a power management error
    pub fn power<M: Into<String>>(message: M) -> Self {
        Self::PowerManagement {
            message: message.into(),
        }
    }

    /// Create a service error
    pub fn service<M: Into<String>>(message: M) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Create a container error
    pub fn container<M: Into<String>>(message: M) -> Self {
        Self::Container {
            message: message.into(),
        }
    }

    /// Create a node collection error
    pub fn node_collection<M: Into<String>>(message: M) -> Self {
        Self::NodeCollection {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported<D: Into<String>, O: Into<String>>(driver: D, operation: O) -> Self {
        Self::Unsupported {
            driver: driver.into(),
            operation: operation.into(),
        }
    }

    /// Create a required-variable error
    pub fn required_variable<O: Into<String>, V: Into<String>>(owner: O, variable: V) -> Self {
        Self::RequiredVariableMissing {
            owner: owner.into(),
            variable: variable.into(),
        }
    }

    /// Records attached to an executor failure, if any
    pub fn records(&self) -> Option<&[TaskRecord]> {
        match self {
            Self::Execution { records, .. } | Self::Unreachable { records, .. } => Some(records),
            _ => None,
        }
    }

    /// Whether this error came from the remote executor
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Unreachable { .. })
    }
}

impl From<serde_json::Error> for OsFaultsError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(format!("Invalid configuration: {err}"))
    }
}

impl From<serde_yaml::Error> for OsFaultsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(format!("Invalid YAML configuration: {err}"))
    }
}

/// Result type for fault-injection operations
pub type Result<T> = std::result::Result<T, OsFaultsError>;
