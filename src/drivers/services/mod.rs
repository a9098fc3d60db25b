// ============================================================================
// File: os-faults/src/drivers/services/mod.rs
// ----------------------------------------------------------------------------
// Service drivers.
//
// Every flavor builds a `ProcessService`; flavors only choose the lifecycle
// commands, the process pattern and the discovery mode.
// ============================================================================

mod flavors;
mod process;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::executor::{Task, shell_quote};
use crate::registry::DriverSpec;

pub use process::{Discovery, LifecycleCommands, ProcessService};

/// Every built-in service driver
pub fn specs() -> Vec<DriverSpec> {
    vec![
        flavors::process_spec(),
        flavors::system_service_spec(),
        flavors::linux_service_spec(),
        flavors::systemd_service_spec(),
        flavors::pcs_service_spec(),
        flavors::pcs_or_linux_service_spec(),
        flavors::salt_service_spec(),
        flavors::docker_process_spec(),
    ]
}

/// A configured command, as one shell line or as an argument vector
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn into_task(self) -> Task {
        match self {
            Self::Line(line) => Task::shell(line),
            Self::Argv(argv) => Task::command(
                argv.iter()
                    .map(|arg| shell_quote(arg))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}

/// Arguments every service flavor accepts
#[derive(Debug, Clone, Default, Deserialize)]
struct CommonArgs {
    #[serde(default)]
    grep: Option<String>,
    #[serde(default)]
    restart_cmd: Option<CommandSpec>,
    #[serde(default)]
    terminate_cmd: Option<CommandSpec>,
    #[serde(default)]
    start_cmd: Option<CommandSpec>,
    #[serde(default)]
    port: Option<(String, u16)>,
    #[serde(default)]
    hosts: Option<Vec<String>>,
}

impl CommonArgs {
    fn configured_commands(&self) -> LifecycleCommands {
        LifecycleCommands {
            restart: self.restart_cmd.clone().map(CommandSpec::into_task),
            terminate: self.terminate_cmd.clone().map(CommandSpec::into_task),
            start: self.start_cmd.clone().map(CommandSpec::into_task),
        }
    }
}

fn command_schema() -> Value {
    json!({
        "oneOf": [
            {"type": "string"},
            {"type": "array", "items": {"type": "string"}, "minItems": 1}
        ]
    })
}

/// Object schema with the shared service properties plus `own`
///
/// # Arguments
/// * `own` - Flavor specific properties
/// * `required` - Required property names
/// * `with_commands` - Accept `restart_cmd`, `terminate_cmd` and `start_cmd`
fn service_schema(own: &[(&str, Value)], required: &[&str], with_commands: bool) -> Value {
    let mut properties = Map::new();
    properties.insert("grep".to_string(), json!({"type": "string"}));
    properties.insert(
        "port".to_string(),
        json!({
            "type": "array",
            "items": {"type": ["string", "integer"]},
            "minItems": 2,
            "maxItems": 2
        }),
    );
    properties.insert(
        "hosts".to_string(),
        json!({"type": "array", "items": {"type": "string"}, "minItems": 1}),
    );
    if with_commands {
        for key in ["restart_cmd", "terminate_cmd", "start_cmd"] {
            properties.insert(key.to_string(), command_schema());
        }
    }
    for (key, schema) in own {
        properties.insert((*key).to_string(), schema.clone());
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}
