//! ============================================================================
//! File: os-faults/src/lib.rs
//! ----------------------------------------------------------------------------
//! Fault injection for cloud deployments.
//!
//! A configuration document names a cloud management driver, an optional
//! node discovery, power drivers and service / container catalogs. Connecting
//! wires them into a [`CloudManagement`] whose node collections, services and
//! containers inject faults over SSH, libvirt and IPMI:
//!
//! ```no_run
//! # async fn run() -> os_faults::Result<()> {
//! let cloud = os_faults::connect_from_file(None)?;
//! cloud.verify().await?;
//! cloud.get_service("keystone")?.restart(None).await?;
//! os_faults::human_api(&cloud, "kill mysql service on one node").await?;
//! # Ok(())
//! # }
//! ```
//! ============================================================================

pub mod api;
pub mod config;
pub mod drivers;
pub mod error;
pub mod executor;
mod loader;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use api::{
    CloudManagement, Container, ContainerAction, Host, HostAuth, JumpHost, NodeCollection,
    PowerAction, Service, ServiceAction,
};
pub use config::{CloudConfig, DriverConf};
pub use error::{OsFaultsError, Result};
pub use loader::{connect, connect_from_file, connect_with, discover, discover_with, human_api};
pub use registry::{DriverContext, Registry};
