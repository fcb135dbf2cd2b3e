//! Container runtime that owns the actual browser processes.

use async_trait::async_trait;

use browserhub_core::result::AppResult;
use browserhub_core::types::ContainerId;
use browserhub_entity::container::ContainerInfo;

/// Lifecycle operations on virtual browser containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + std::fmt::Debug + 'static {
    /// Prepare the runtime. Returns `false` if no container can be served.
    async fn initialize(&self) -> AppResult<bool>;

    /// Hand a claimed container to a room.
    ///
    /// Returns `None` if the container is not running.
    async fn allocate(&self, container_id: &ContainerId) -> AppResult<Option<ContainerInfo>>;

    /// Reset a container after its lease ends.
    async fn return_to_pool(&self, container_id: &ContainerId) -> AppResult<()>;

    /// Restart the browser process inside a container.
    async fn restart_process(&self, container_id: &ContainerId) -> AppResult<bool>;

    /// Containers currently running.
    async fn list_running(&self) -> AppResult<Vec<ContainerInfo>>;
}
