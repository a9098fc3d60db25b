// ============================================================================
// File: os-faults/src/api/power.rs
// ----------------------------------------------------------------------------
// PowerDriver capability and the PowerManager dispatcher.
//
// Each host is owned by the first driver (in insertion order) that claims
// it; one blocking worker runs per (driver, host) pair and all workers are
// joined before the verb returns.
// ============================================================================

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::task::JoinSet;

use crate::api::Host;
use crate::error::{OsFaultsError, Result};

/// Out-of-band control of a machine's run state
///
/// Verbs are synchronous; the dispatcher runs them on blocking workers.
pub trait PowerDriver: Send + Sync + fmt::Debug {
    /// Driver name as registered
    fn name(&self) -> &'static str;

    /// Whether this driver can act on `host`
    fn supports(&self, host: &Host) -> bool;

    fn poweroff(&self, host: &Host) -> Result<()>;

    fn poweron(&self, host: &Host) -> Result<()>;

    fn reset(&self, host: &Host) -> Result<()>;

    fn shutdown(&self, host: &Host) -> Result<()>;

    /// Create a named snapshot of the host
    fn snapshot(&self, _host: &Host, _snapshot_name: &str, _suspend: bool) -> Result<()> {
        Err(OsFaultsError::unsupported(self.name(), "snapshot"))
    }

    /// Revert the host to a named snapshot
    fn revert(&self, _host: &Host, _snapshot_name: &str, _resume: bool) -> Result<()> {
        Err(OsFaultsError::unsupported(self.name(), "revert"))
    }
}

/// A power verb with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerAction {
    Poweroff,
    Poweron,
    Reset,
    Shutdown,
    Snapshot { name: String, suspend: bool },
    Revert { name: String, resume: bool },
}

impl PowerAction {
    fn apply(&self, driver: &dyn PowerDriver, host: &Host) -> Result<()> {
        match self {
            Self::Poweroff => driver.poweroff(host),
            Self::Poweron => driver.poweron(host),
            Self::Reset => driver.reset(host),
            Self::Shutdown => driver.shutdown(host),
            Self::Snapshot { name, suspend } => driver.snapshot(host, name, *suspend),
            Self::Revert { name, resume } => driver.revert(host, name, *resume),
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poweroff => f.write_str("poweroff"),
            Self::Poweron => f.write_str("poweron"),
            Self::Reset => f.write_str("reset"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::Snapshot { name, .. } => write!(f, "snapshot {name}"),
            Self::Revert { name, .. } => write!(f, "revert {name}"),
        }
    }
}

/// Ordered list of power drivers
#[derive(Debug, Clone, Default)]
pub struct PowerManager {
    drivers: Vec<Arc<dyn PowerDriver>>,
}

impl PowerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_driver(&mut self, driver: Arc<dyn PowerDriver>) {
        self.drivers.push(driver);
    }

    pub fn drivers(&self) -> &[Arc<dyn PowerDriver>] {
        &self.drivers
    }

    pub async fn poweroff(&self, hosts: &[Host]) -> Result<()> {
        self.run(PowerAction::Poweroff, hosts).await
    }

    pub async fn poweron(&self, hosts: &[Host]) -> Result<()> {
        self.run(PowerAction::Poweron, hosts).await
    }

    pub async fn reset(&self, hosts: &[Host]) -> Result<()> {
        self.run(PowerAction::Reset, hosts).await
    }

    pub async fn shutdown(&self, hosts: &[Host]) -> Result<()> {
        self.run(PowerAction::Shutdown, hosts).await
    }

    pub async fn snapshot(&self, hosts: &[Host], snapshot_name: &str, suspend: bool) -> Result<()> {
        let action = PowerAction::Snapshot {
            name: snapshot_name.to_string(),
            suspend,
        };
        self.run(action, hosts).await
    }

    pub async fn revert(&self, hosts: &[Host], snapshot_name: &str, resume: bool) -> Result<()> {
        let action = PowerAction::Revert {
            name: snapshot_name.to_string(),
            resume,
        };
        self.run(action, hosts).await
    }

    /// Dispatch `action` to the owning driver of every host
    ///
    /// # Returns
    /// `Ok(())` when every worker succeeded; a `PowerManagement` error naming
    /// the unclaimed host or counting the failed workers otherwise
    pub async fn run(&self, action: PowerAction, hosts: &[Host]) -> Result<()> {
        let drivers = self.drivers.clone();
        let owned_hosts = hosts.to_vec();
        // `supports` may talk to a hypervisor or BMC, so it runs off the
        // async workers too.
        let pairs = tokio::task::spawn_blocking(move || map_hosts_to_drivers(&drivers, owned_hosts))
            .await
            .map_err(|e| OsFaultsError::power(format!("Power driver lookup panicked: {e}")))??;

        let mut workers = JoinSet::new();
        for (driver, host) in pairs {
            let action = action.clone();
            workers.spawn_blocking(move || {
                debug!("Running {action} on {host} with driver {}", driver.name());
                let result = action.apply(driver.as_ref(), &host);
                match &result {
                    Ok(()) => info!("{action} completed on {host}"),
                    Err(e) => error!("{action} failed on {host} with driver {}: {e}", driver.name()),
                }
                result
            });
        }

        let mut errors = 0usize;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => errors += 1,
                Err(e) => {
                    error!("Power worker panicked: {e}");
                    errors += 1;
                }
            }
        }

        if errors > 0 {
            return Err(OsFaultsError::power(format!(
                "There are {errors} error(s) when working with power drivers. \
                 Please check logs for more details."
            )));
        }
        Ok(())
    }
}

fn map_hosts_to_drivers(
    drivers: &[Arc<dyn PowerDriver>],
    hosts: Vec<Host>,
) -> Result<Vec<(Arc<dyn PowerDriver>, Host)>> {
    hosts
        .into_iter()
        .map(|host| {
            match drivers.iter().find(|driver| driver.supports(&host)) {
                Some(driver) => Ok((Arc::clone(driver), host)),
                None => Err(OsFaultsError::power(format!(
                    "No supported driver found for host {host}"
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Driver claiming hosts by IP and recording every call
    #[derive(Debug)]
    struct FakeDriver {
        name: &'static str,
        ips: Vec<&'static str>,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDriver {
        fn new(name: &'static str, ips: &[&'static str], fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                ips: ips.to_vec(),
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, verb: &str, host: &Host) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("{verb}:{}", host.ip));
            if self.fail {
                Err(OsFaultsError::power("boom"))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().expect("calls lock").clone();
            calls.sort();
            calls
        }
    }

    impl PowerDriver for FakeDriver {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, host: &Host) -> bool {
            self.ips.contains(&host.ip.as_str())
        }

        fn poweroff(&self, host: &Host) -> Result<()> {
            self.record("poweroff", host)
        }

        fn poweron(&self, host: &Host) -> Result<()> {
            self.record("poweron", host)
        }

        fn reset(&self, host: &Host) -> Result<()> {
            self.record("reset", host)
        }

        fn shutdown(&self, host: &Host) -> Result<()> {
            self.record("shutdown", host)
        }
    }

    #[tokio::test]
    async fn first_supporting_driver_owns_host() {
        let first = FakeDriver::new("first", &["10.0.0.1"], false);
        let second = FakeDriver::new("second", &["10.0.0.1", "10.0.0.2"], false);
        let mut manager = PowerManager::new();
        manager.add_driver(first.clone());
        manager.add_driver(second.clone());

        manager
            .poweroff(&[Host::new("10.0.0.1"), Host::new("10.0.0.2")])
            .await
            .expect("all hosts supported");

        assert_eq!(first.calls(), vec!["poweroff:10.0.0.1"]);
        assert_eq!(second.calls(), vec!["poweroff:10.0.0.2"]);
    }

    #[tokio::test]
    async fn unclaimed_host_fails_before_any_call() {
        let driver = FakeDriver::new("only", &["10.0.0.1"], false);
        let mut manager = PowerManager::new();
        manager.add_driver(driver.clone());

        let err = manager
            .reset(&[Host::new("10.0.0.1"), Host::new("10.0.0.9")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("10.0.0.9"));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn worker_failure_is_aggregated() {
        let driver = FakeDriver::new("flaky", &["10.0.0.1", "10.0.0.2"], true);
        let mut manager = PowerManager::new();
        manager.add_driver(driver.clone());

        let err = manager
            .shutdown(&[Host::new("10.0.0.1"), Host::new("10.0.0.2")])
            .await
            .unwrap_err();

        assert!(matches!(err, OsFaultsError::PowerManagement { .. }));
        assert!(err.to_string().contains("2 error(s)"));
        assert_eq!(driver.calls().len(), 2);
    }

    #[tokio::test]
    async fn unimplemented_verb_is_not_a_noop() {
        let driver = FakeDriver::new("basic", &["10.0.0.1"], false);
        let mut manager = PowerManager::new();
        manager.add_driver(driver);

        let result = manager.snapshot(&[Host::new("10.0.0.1")], "snap", true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_manager_rejects_hosts() {
        let manager = PowerManager::new();
        assert!(manager.poweron(&[Host::new("10.0.0.1")]).await.is_err());
        assert!(manager.poweron(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_is_unsupported_unless_overridden() {
        let driver = FakeDriver::new("plain", &["10.0.0.1"], false);
        let mut manager = PowerManager::new();
        manager.add_driver(driver.clone());
        let hosts = [Host::new("10.0.0.1")];

        assert!(manager.snapshot(&hosts, "snap", true).await.is_err());
        assert!(manager.revert(&hosts, "snap", true).await.is_err());
        assert!(driver.calls().is_empty());
        assert!(matches!(
            driver.snapshot(&hosts[0], "snap", false),
            Err(OsFaultsError::Unsupported { .. })
        ));
    }
}
