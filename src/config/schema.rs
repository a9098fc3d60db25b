// ============================================================================
// File: os-faults/src/config/schema.rs
// ----------------------------------------------------------------------------
// JSON schema of the top-level configuration document
// ============================================================================

use serde_json::{Value, json};

/// Schema every configuration document must satisfy
pub fn config_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-04/schema#",
        "type": "object",
        "definitions": {
            "driver": {
                "type": "object",
                "properties": {
                    "driver": {"type": "string"},
                    "args": {"type": ["object", "array"]}
                },
                "required": ["driver"],
                "additionalProperties": false
            },
            "driver_map": {
                "type": "object",
                "additionalProperties": {"$ref": "#/definitions/driver"}
            }
        },
        "properties": {
            "cloud_management": {"$ref": "#/definitions/driver"},
            "node_discover": {"$ref": "#/definitions/driver"},
            "power_management": {"$ref": "#/definitions/driver"},
            "power_managements": {
                "type": "array",
                "items": {"$ref": "#/definitions/driver"}
            },
            "services": {"$ref": "#/definitions/driver_map"},
            "containers": {"$ref": "#/definitions/driver_map"}
        },
        "required": ["cloud_management"],
        "additionalProperties": false
    })
}
