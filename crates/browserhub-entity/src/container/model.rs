//! Container value objects.

use serde::{Deserialize, Serialize};

use browserhub_core::types::ContainerId;

/// A slot claimed from the container pool.
///
/// Holding a handle means the pool will not hand the same container to
/// anyone else until it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// The claimed container.
    pub container_id: ContainerId,
}

impl ContainerHandle {
    /// Wrap a claimed container id.
    pub fn new(container_id: ContainerId) -> Self {
        Self { container_id }
    }
}

/// What the runtime knows about a running container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Runtime name of the container.
    pub id: ContainerId,
    /// Address clients use to reach the browser.
    pub url: String,
}

impl ContainerInfo {
    /// Describe a container.
    pub fn new(id: impl Into<ContainerId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Number of slots in the pool.
    pub capacity: u32,
    /// Slots free right now. A hint only.
    pub available: u32,
}
