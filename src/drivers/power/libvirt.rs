// ============================================================================
// File: os-faults/src/drivers/power/libvirt.rs
// ----------------------------------------------------------------------------
// `libvirt` power driver.
//
// Hosts are matched to domains by libvirt name first and then by MAC
// address inside the domain XML. The hypervisor connection is opened on
// first use and reused afterwards.
// ============================================================================

use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{Host, PowerDriver};
use crate::error::{OsFaultsError, Result};
use crate::registry::{DriverContext, DriverSpec, parse_args};

pub const NAME: &str = "libvirt";

/// A domain known to the hypervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    /// Domain XML description
    pub xml: String,
}

/// Open hypervisor connection
pub trait Hypervisor: Send + Sync + fmt::Debug {
    fn list_domains(&self) -> Result<Vec<Domain>>;

    /// Hard power off
    fn destroy(&self, domain: &str) -> Result<()>;

    /// Boot a defined domain
    fn create(&self, domain: &str) -> Result<()>;

    fn reset(&self, domain: &str) -> Result<()>;

    /// Graceful ACPI shutdown
    fn shutdown(&self, domain: &str) -> Result<()>;

    fn suspend(&self, domain: &str) -> Result<()>;

    fn resume(&self, domain: &str) -> Result<()>;

    fn is_active(&self, domain: &str) -> Result<bool>;

    fn snapshot_create(&self, domain: &str, snapshot_name: &str) -> Result<()>;

    fn snapshot_revert(&self, domain: &str, snapshot_name: &str) -> Result<()>;
}

/// Opens hypervisor connections by URI
pub trait HypervisorConnector: Send + Sync + fmt::Debug {
    fn connect(&self, uri: &str) -> Result<Arc<dyn Hypervisor>>;
}

#[derive(Debug, Deserialize)]
struct LibvirtArgs {
    connection_uri: String,
}

fn config_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "connection_uri": {"type": "string"}
        },
        "required": ["connection_uri"],
        "additionalProperties": false
    })
}

pub fn spec() -> DriverSpec {
    DriverSpec {
        power: Some(build),
        ..DriverSpec::new(NAME, "Libvirt power management driver", config_schema)
    }
}

fn build(args: &Value, ctx: &DriverContext) -> Result<Arc<dyn PowerDriver>> {
    let args: LibvirtArgs = parse_args(NAME, args)?;
    Ok(Arc::new(LibvirtDriver::new(
        args.connection_uri,
        Arc::clone(&ctx.hypervisors),
    )))
}

/// Power driver for libvirt-managed virtual machines
#[derive(Debug)]
pub struct LibvirtDriver {
    connection_uri: String,
    connector: Arc<dyn HypervisorConnector>,
    conn: Mutex<Option<Arc<dyn Hypervisor>>>,
}

impl LibvirtDriver {
    pub fn new(connection_uri: String, connector: Arc<dyn HypervisorConnector>) -> Self {
        Self {
            connection_uri,
            connector,
            conn: Mutex::new(None),
        }
    }

    fn hypervisor(&self) -> Result<Arc<dyn Hypervisor>> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| OsFaultsError::power("Libvirt connection lock poisoned"))?;
        if let Some(hypervisor) = conn.as_ref() {
            return Ok(Arc::clone(hypervisor));
        }
        debug!("Connecting to libvirt at {}", self.connection_uri);
        let hypervisor = self.connector.connect(&self.connection_uri)?;
        *conn = Some(Arc::clone(&hypervisor));
        Ok(hypervisor)
    }

    fn find_domain(&self, host: &Host) -> Result<(Arc<dyn Hypervisor>, String)> {
        let hypervisor = self.hypervisor()?;
        let domains = hypervisor.list_domains()?;

        if let Some(name) = &host.libvirt_name
            && domains.iter().any(|d| &d.name == name)
        {
            return Ok((hypervisor, name.clone()));
        }

        if let Some(mac) = &host.mac {
            let mac = mac.to_lowercase();
            if let Some(domain) = domains.iter().find(|d| d.xml.to_lowercase().contains(&mac)) {
                return Ok((hypervisor, domain.name.clone()));
            }
        }

        Err(OsFaultsError::power(format!("Domain not found for host {host}")))
    }
}

impl PowerDriver for LibvirtDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, host: &Host) -> bool {
        match self.find_domain(host) {
            Ok(_) => true,
            Err(e) => {
                debug!("{e}");
                false
            }
        }
    }

    fn poweroff(&self, host: &Host) -> Result<()> {
        let (hypervisor, domain) = self.find_domain(host)?;
        debug!("Power off domain {domain}");
        hypervisor.destroy(&domain)?;
        info!("Domain {domain} was powered off");
        Ok(())
    }

    fn poweron(&self, host: &Host) -> Result<()> {
        let (hypervisor, domain) = self.find_domain(host)?;
        debug!("Power on domain {domain}");
        hypervisor.create(&domain)?;
        info!("Domain {domain} was powered on");
        Ok(())
    }

    fn reset(&self, host: &Host) -> Result<()> {
        let (hypervisor, domain) = self.find_domain(host)?;
        debug!("Reset domain {domain}");
        hypervisor.reset(&domain)?;
        info!("Domain {domain} was reset");
        Ok(())
    }

    fn shutdown(&self, host: &Host) -> Result<()> {
        let (hypervisor, domain) = self.find_domain(host)?;
        debug!("Shutdown domain {domain}");
        hypervisor.shutdown(&domain)?;
        info!("Domain {domain} was shut down");
        Ok(())
    }

    fn snapshot(&self, host: &Host, snapshot_name: &str, suspend: bool) -> Result<()> {
        let (hypervisor, domain) = self.find_domain(host)?;
        debug!("Create snapshot {snapshot_name} for domain {domain}");
        if suspend {
            hypervisor.suspend(&domain)?;
        }
        hypervisor.snapshot_create(&domain, snapshot_name)?;
        if suspend {
            hypervisor.resume(&domain)?;
        }
        info!("Created snapshot {snapshot_name} for domain {domain}");
        Ok(())
    }

    fn revert(&self, host: &Host, snapshot_name: &str, resume: bool) -> Result<()> {
        let (hypervisor, domain) = self.find_domain(host)?;
        debug!("Revert domain {domain} to snapshot {snapshot_name}");
        if hypervisor.is_active(&domain)? {
            hypervisor.destroy(&domain)?;
        }
        hypervisor.snapshot_revert(&domain, snapshot_name)?;
        if resume {
            hypervisor.resume(&domain)?;
        }
        info!("Domain {domain} reverted to snapshot {snapshot_name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct FakeHypervisor {
        active: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeHypervisor {
        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().expect("calls lock").push(call);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl Hypervisor for FakeHypervisor {
        fn list_domains(&self) -> Result<Vec<Domain>> {
            Ok(vec![
                Domain {
                    name: "vm1".to_string(),
                    xml: "<mac address='AA:BB:CC:DD:EE:01'/>".to_string(),
                },
                Domain {
                    name: "vm2".to_string(),
                    xml: "<mac address='aa:bb:cc:dd:ee:02'/>".to_string(),
                },
            ])
        }

        fn destroy(&self, domain: &str) -> Result<()> {
            self.record(format!("destroy {domain}"))
        }

        fn create(&self, domain: &str) -> Result<()> {
            self.record(format!("create {domain}"))
        }

        fn reset(&self, domain: &str) -> Result<()> {
            self.record(format!("reset {domain}"))
        }

        fn shutdown(&self, domain: &str) -> Result<()> {
            self.record(format!("shutdown {domain}"))
        }

        fn suspend(&self, domain: &str) -> Result<()> {
            self.record(format!("suspend {domain}"))
        }

        fn resume(&self, domain: &str) -> Result<()> {
            self.record(format!("resume {domain}"))
        }

        fn is_active(&self, _domain: &str) -> Result<bool> {
            Ok(self.active)
        }

        fn snapshot_create(&self, domain: &str, snapshot_name: &str) -> Result<()> {
            self.record(format!("snapshot {domain} {snapshot_name}"))
        }

        fn snapshot_revert(&self, domain: &str, snapshot_name: &str) -> Result<()> {
            self.record(format!("revert {domain} {snapshot_name}"))
        }
    }

    #[derive(Debug)]
    struct FakeConnector {
        hypervisor: Arc<FakeHypervisor>,
        connects: AtomicUsize,
    }

    impl HypervisorConnector for FakeConnector {
        fn connect(&self, _uri: &str) -> Result<Arc<dyn Hypervisor>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.hypervisor.clone())
        }
    }

    fn fixture(active: bool) -> (LibvirtDriver, Arc<FakeHypervisor>, Arc<FakeConnector>) {
        let hypervisor = Arc::new(FakeHypervisor {
            active,
            ..FakeHypervisor::default()
        });
        let connector = Arc::new(FakeConnector {
            hypervisor: hypervisor.clone(),
            connects: AtomicUsize::new(0),
        });
        let driver = LibvirtDriver::new("qemu:///system".to_string(), connector.clone());
        (driver, hypervisor, connector)
    }

    #[test]
    fn domains_resolve_by_name_then_mac() {
        let (driver, _, connector) = fixture(true);

        assert!(driver.supports(&Host::new("10.0.0.1").with_libvirt_name("vm2")));
        assert!(driver.supports(&Host::new("10.0.0.1").with_mac("aa:bb:cc:dd:ee:01")));
        assert!(driver.supports(
            &Host::new("10.0.0.1")
                .with_libvirt_name("gone")
                .with_mac("aa:bb:cc:dd:ee:02")
        ));
        assert!(!driver.supports(&Host::new("10.0.0.1").with_mac("aa:bb:cc:dd:ee:ff")));
        assert!(!driver.supports(&Host::new("10.0.0.1")));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_with_suspend_resumes_domain() {
        let (driver, hypervisor, _) = fixture(true);
        let host = Host::new("10.0.0.1").with_libvirt_name("vm1");

        driver.snapshot(&host, "snap", true).expect("snapshot");
        assert_eq!(hypervisor.calls(), vec!["suspend vm1", "snapshot vm1 snap", "resume vm1"]);
    }

    #[test]
    fn snapshot_without_suspend_leaves_run_state() {
        let (driver, hypervisor, _) = fixture(true);
        let host = Host::new("10.0.0.1").with_libvirt_name("vm1");

        driver.snapshot(&host, "snap", false).expect("snapshot");
        assert_eq!(hypervisor.calls(), vec!["snapshot vm1 snap"]);
    }

    #[test]
    fn revert_destroys_only_active_domains() {
        let (driver, hypervisor, _) = fixture(true);
        let host = Host::new("10.0.0.1").with_libvirt_name("vm1");
        driver.revert(&host, "snap", true).expect("revert");
        assert_eq!(hypervisor.calls(), vec!["destroy vm1", "revert vm1 snap", "resume vm1"]);

        let (driver, hypervisor, _) = fixture(false);
        driver.revert(&host, "snap", false).expect("revert");
        assert_eq!(hypervisor.calls(), vec!["revert vm1 snap"]);
    }

    #[test]
    fn verbs_map_to_domain_operations() {
        let (driver, hypervisor, _) = fixture(true);
        let host = Host::new("10.0.0.1").with_mac("AA:BB:CC:DD:EE:02");

        driver.poweroff(&host).expect("poweroff");
        driver.poweron(&host).expect("poweron");
        driver.reset(&host).expect("reset");
        driver.shutdown(&host).expect("shutdown");

        assert_eq!(
            hypervisor.calls(),
            vec!["destroy vm2", "create vm2", "reset vm2", "shutdown vm2"]
        );
    }

    #[test]
    fn unknown_host_fails_the_verb() {
        let (driver, _, _) = fixture(true);
        let err = driver.poweroff(&Host::new("10.0.0.9")).unwrap_err();
        assert!(matches!(err, OsFaultsError::PowerManagement { .. }));
    }
}
