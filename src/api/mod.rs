// ============================================================================
// File: os-faults/src/api/mod.rs
// ----------------------------------------------------------------------------
// Public fault-injection API.
//
// - Host value object and NodeCollection set algebra
// - PowerDriver capability and the concurrent PowerManager dispatcher
// - Service / Container capabilities
// - CloudManagement façade tying discovery, services and power together
// - Human API: natural-language commands bound to the above
// ============================================================================

mod cloud_management;
mod container;
mod host;
pub mod human;
mod node_collection;
mod node_discover;
mod power;
mod service;

pub use cloud_management::{CloudManagement, CloudManagementBuilder, CloudManagementDriver};
pub use container::{Container, ContainerAction};
pub use host::{Host, HostAuth, JumpHost};
pub use human::Destructor;
pub use node_collection::NodeCollection;
pub use node_discover::NodeDiscover;
pub use power::{PowerAction, PowerDriver, PowerManager};
pub use service::{Service, ServiceAction};
