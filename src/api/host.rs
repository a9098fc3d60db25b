// ============================================================================
// File: os-faults/src/api/host.rs
// ----------------------------------------------------------------------------
// Host value object and per-host SSH credentials.
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Intermediary SSH endpoint used to reach a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpHost {
    /// Jump host address
    pub host: String,

    /// Login on the jump host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Private key used for the jump host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<String>,
}

/// SSH credentials attached to a single host
///
/// Every field overrides the matching executor-wide default for this host only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#become: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub become_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub become_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump: Option<JumpHost>,
}

/// An individually addressable machine in the cloud
///
/// Equality, ordering and hashing only consider
/// `(ip, mac, fqdn, libvirt_name)`; credentials never distinguish two hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libvirt_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HostAuth>,
}

impl Host {
    /// Create a host known only by its address
    pub fn new<I: Into<String>>(ip: I) -> Self {
        Self {
            ip: ip.into(),
            mac: None,
            fqdn: None,
            libvirt_name: None,
            auth: None,
        }
    }

    pub fn with_mac<M: Into<String>>(mut self, mac: M) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn with_fqdn<F: Into<String>>(mut self, fqdn: F) -> Self {
        self.fqdn = Some(fqdn.into());
        self
    }

    pub fn with_libvirt_name<N: Into<String>>(mut self, name: N) -> Self {
        self.libvirt_name = Some(name.into());
        self
    }

    pub fn with_auth(mut self, auth: HostAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    fn key(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
        (
            self.ip.as_str(),
            self.mac.as_deref(),
            self.fqdn.as_deref(),
            self.libvirt_name.as_deref(),
        )
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Host {}

impl PartialOrd for Host {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Host {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host(ip={}", self.ip)?;
        if let Some(mac) = &self.mac {
            write!(f, ", mac={mac}")?;
        }
        if let Some(fqdn) = &self.fqdn {
            write!(f, ", fqdn={fqdn}")?;
        }
        if let Some(name) = &self.libvirt_name {
            write!(f, ", libvirt_name={name}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn auth_does_not_affect_identity() {
        let plain = Host::new("10.0.0.2").with_fqdn("node-2");
        let with_auth = plain.clone().with_auth(HostAuth {
            username: Some("root".to_string()),
            ..HostAuth::default()
        });

        assert_eq!(plain, with_auth);
        let set: BTreeSet<Host> = [plain, with_auth].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ordering_follows_ip_first() {
        let a = Host::new("10.0.0.1").with_mac("ff:ff:ff:ff:ff:ff");
        let b = Host::new("10.0.0.2").with_mac("00:00:00:00:00:00");
        assert!(a < b);
    }

    #[test]
    fn deserializes_node_list_entry() {
        let host: Host = serde_json::from_value(serde_json::json!({
            "ip": "10.0.0.51",
            "mac": "52:54:00:aa:bb:cc",
            "fqdn": "node-1.local",
            "auth": {"username": "ubuntu", "jump": {"host": "10.0.0.1"}}
        }))
        .expect("valid host");

        assert_eq!(host.fqdn.as_deref(), Some("node-1.local"));
        let auth = host.auth.expect("auth present");
        assert_eq!(auth.jump.map(|j| j.host), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn display_skips_missing_fields() {
        let host = Host::new("10.0.0.3").with_fqdn("node-3");
        assert_eq!(host.to_string(), "Host(ip=10.0.0.3, fqdn=node-3)");
    }
}
