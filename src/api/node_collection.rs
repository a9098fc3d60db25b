// ============================================================================
// File: os-faults/src/api/node_collection.rs
// ----------------------------------------------------------------------------
// NodeCollection: an immutable, sorted set of hosts bound to one cloud.
//
// Set operations only combine collections of the same kind that belong to
// the same CloudManagement; every operation returns a new collection.
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Sub};

use log::{debug, info};

use crate::api::{CloudManagement, Host};
use crate::error::{OsFaultsError, Result};
use crate::executor::{Task, TaskRecord};

/// A set of hosts treated as a single action target
#[derive(Clone)]
pub struct NodeCollection {
    cloud: CloudManagement,
    kind: &'static str,
    hosts: BTreeSet<Host>,
}

impl NodeCollection {
    /// Create a collection of the cloud's node kind
    pub fn new<I: IntoIterator<Item = Host>>(cloud: &CloudManagement, hosts: I) -> Self {
        Self {
            kind: cloud.node_kind(),
            cloud: cloud.clone(),
            hosts: hosts.into_iter().collect(),
        }
    }

    fn derive<I: IntoIterator<Item = Host>>(&self, hosts: I) -> Self {
        Self {
            cloud: self.cloud.clone(),
            kind: self.kind,
            hosts: hosts.into_iter().collect(),
        }
    }

    pub fn cloud_management(&self) -> &CloudManagement {
        &self.cloud
    }

    /// Concrete collection kind, e.g. `FuelNodeCollection`
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Hosts in sorted order
    pub fn hosts(&self) -> Vec<Host> {
        self.hosts.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Host> {
        self.hosts.iter().nth(index)
    }

    pub fn contains(&self, host: &Host) -> bool {
        self.hosts.contains(host)
    }

    pub fn get_ips(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.ip.clone()).collect()
    }

    pub fn get_macs(&self) -> Vec<String> {
        self.hosts.iter().filter_map(|h| h.mac.clone()).collect()
    }

    pub fn get_fqdns(&self) -> Vec<String> {
        self.hosts.iter().filter_map(|h| h.fqdn.clone()).collect()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.kind != other.kind {
            return Err(OsFaultsError::node_collection(format!(
                "Unsupported operand types: {} and {}",
                self.kind, other.kind
            )));
        }
        if !self.cloud.same_instance(&other.cloud) {
            return Err(OsFaultsError::node_collection(
                "NodeCollections have different cloud managements",
            ));
        }
        Ok(())
    }

    pub fn union(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(self.derive(self.hosts.union(&other.hosts).cloned()))
    }

    pub fn difference(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(self.derive(self.hosts.difference(&other.hosts).cloned()))
    }

    pub fn intersection(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(self.derive(self.hosts.intersection(&other.hosts).cloned()))
    }

    pub fn symmetric_difference(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        Ok(self.derive(self.hosts.symmetric_difference(&other.hosts).cloned()))
    }

    /// Choose `count` hosts uniformly at random without replacement
    ///
    /// Randomness comes from the thread-local generator of `rand`.
    pub fn pick(&self, count: usize) -> Result<Self> {
        if count > self.hosts.len() {
            return Err(OsFaultsError::node_collection(format!(
                "Cannot pick {count} from {} node(s)",
                self.hosts.len()
            )));
        }
        let hosts: Vec<&Host> = self.hosts.iter().collect();
        let mut rng = rand::rng();
        let picked = rand::seq::index::sample(&mut rng, hosts.len(), count)
            .into_iter()
            .map(|i| hosts[i].clone());
        Ok(self.derive(picked))
    }

    /// Hosts satisfying `criteria`; an empty result is an error
    pub fn filter<F>(&self, criteria: F) -> Result<Self>
    where
        F: Fn(&Host) -> bool,
    {
        let filtered = self.retain(criteria);
        if filtered.is_empty() {
            return Err(OsFaultsError::node_collection(
                "No nodes found according to criterion",
            ));
        }
        Ok(filtered)
    }

    /// Hosts satisfying `criteria`, possibly none
    pub(crate) fn retain<F>(&self, criteria: F) -> Self
    where
        F: Fn(&Host) -> bool,
    {
        self.derive(self.hosts.iter().filter(|h| criteria(h)).cloned())
    }

    /// Run an arbitrary task on every host
    pub async fn run_task(&self, task: &Task, raise_on_error: bool) -> Result<Vec<TaskRecord>> {
        info!("Run task: {task} on nodes: {self:?}");
        self.cloud
            .execute_on_cloud(&self.hosts(), task, raise_on_error)
            .await
    }

    pub async fn reboot(&self) -> Result<()> {
        info!("Reboot nodes: {:?}", self.get_ips());
        self.cloud
            .execute_on_cloud(&self.hosts(), &Task::command("reboot now"), true)
            .await
            .map(|_| ())
    }

    pub async fn poweroff(&self) -> Result<()> {
        info!("Power off nodes: {:?}", self.get_ips());
        self.cloud.power_manager().poweroff(&self.hosts()).await
    }

    pub async fn poweron(&self) -> Result<()> {
        info!("Power on nodes: {:?}", self.get_ips());
        self.cloud.power_manager().poweron(&self.hosts()).await
    }

    pub async fn reset(&self) -> Result<()> {
        info!("Reset nodes: {:?}", self.get_ips());
        self.cloud.power_manager().reset(&self.hosts()).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutdown nodes: {:?}", self.get_ips());
        self.cloud.power_manager().shutdown(&self.hosts()).await
    }

    pub async fn snapshot(&self, snapshot_name: &str, suspend: bool) -> Result<()> {
        info!("Create snapshot '{snapshot_name}' of nodes: {:?}", self.get_ips());
        self.cloud
            .power_manager()
            .snapshot(&self.hosts(), snapshot_name, suspend)
            .await
    }

    pub async fn revert(&self, snapshot_name: &str, resume: bool) -> Result<()> {
        info!("Revert nodes {:?} to snapshot '{snapshot_name}'", self.get_ips());
        self.cloud
            .power_manager()
            .revert(&self.hosts(), snapshot_name, resume)
            .await
    }

    /// Bring `network` back up on every host
    pub async fn connect(&self, network: &str) -> Result<()> {
        debug!("Connect network {network} on nodes: {:?}", self.get_ips());
        self.cloud.driver().connect_network(self, network).await
    }

    /// Take `network` down on every host
    pub async fn disconnect(&self, network: &str) -> Result<()> {
        debug!("Disconnect network {network} on nodes: {:?}", self.get_ips());
        self.cloud.driver().disconnect_network(self, network).await
    }
}

impl PartialEq for NodeCollection {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.cloud.same_instance(&other.cloud) && self.hosts == other.hosts
    }
}

impl fmt::Debug for NodeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        f.debug_list().entries(self.hosts.iter().map(|h| h.to_string())).finish()?;
        write!(f, ")")
    }
}

impl<'a> IntoIterator for &'a NodeCollection {
    type Item = &'a Host;
    type IntoIter = std::collections::btree_set::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

impl Add for &NodeCollection {
    type Output = Result<NodeCollection>;

    fn add(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOr for &NodeCollection {
    type Output = Result<NodeCollection>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl Sub for &NodeCollection {
    type Output = Result<NodeCollection>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.difference(rhs)
    }
}

impl BitAnd for &NodeCollection {
    type Output = Result<NodeCollection>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersection(rhs)
    }
}

impl BitXor for &NodeCollection {
    type Output = Result<NodeCollection>;

    fn bitxor(self, rhs: Self) -> Self::Output {
        self.symmetric_difference(rhs)
    }
}
