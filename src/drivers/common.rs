// ============================================================================
// File: os-faults/src/drivers/common.rs
// ----------------------------------------------------------------------------
// Schema fragments shared by several drivers
// ============================================================================

use serde_json::{Value, json};

pub const MAC_PATTERN: &str = "^[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}$";

/// Schema of a per-host `auth` record
pub fn auth_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "username": {"type": "string"},
            "password": {"type": "string"},
            "private_key_file": {"type": "string"},
            "become": {"type": "boolean"},
            "become_password": {"type": "string"},
            "become_method": {"type": "string"},
            "jump": {
                "type": "object",
                "properties": {
                    "host": {"type": "string"},
                    "username": {"type": "string"},
                    "private_key_file": {"type": "string"}
                },
                "required": ["host"],
                "additionalProperties": false
            }
        },
        "additionalProperties": false
    })
}

/// Schema of one statically described host
pub fn host_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ip": {"type": "string"},
            "mac": {"type": "string", "pattern": MAC_PATTERN},
            "fqdn": {"type": "string"},
            "libvirt_name": {"type": "string"},
            "auth": auth_schema()
        },
        "required": ["ip"],
        "additionalProperties": false
    })
}

/// Schema of the executor batch size
pub fn serial_schema() -> Value {
    json!({"type": "integer", "minimum": 1})
}
