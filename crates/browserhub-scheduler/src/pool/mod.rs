//! Fixed-size pool of interchangeable container slots.
//!
//! Provides atomic claim/return using either:
//! - an in-memory mutex (single-node deployments)
//! - Redis set operations and Lua scripts (multi-node deployments)

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

use async_trait::async_trait;

use browserhub_core::result::AppResult;
use browserhub_core::types::ContainerId;
use browserhub_entity::container::{ContainerHandle, PoolStatus};

pub use memory::MemoryContainerPool;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisContainerPool;

/// Trait for atomic container slot allocation.
///
/// `try_allocate` is the only gate: it checks for a free slot and claims
/// it in one step. `available_count` is a hint for deciding whether work
/// is worth attempting, never a reservation.
#[async_trait]
pub trait ContainerPool: Send + Sync + std::fmt::Debug + 'static {
    /// Claim one free slot, or `None` if every slot is busy.
    async fn try_allocate(&self) -> AppResult<Option<ContainerHandle>>;

    /// Mark a slot free again. Idempotent.
    ///
    /// Returns `true` if the slot transitioned from busy to free.
    async fn release(&self, container_id: &ContainerId) -> AppResult<bool>;

    /// Number of free slots right now.
    async fn available_count(&self) -> AppResult<u32>;

    /// Number of slots in the pool.
    async fn capacity(&self) -> AppResult<u32>;

    /// Reset the pool to `containers`, with `held` already claimed.
    ///
    /// Ids in `held` that are not in `containers` are ignored.
    async fn seed(&self, containers: &[ContainerId], held: &[ContainerId]) -> AppResult<()>;

    /// Capacity and availability in one snapshot.
    async fn status(&self) -> AppResult<PoolStatus> {
        Ok(PoolStatus {
            capacity: self.capacity().await?,
            available: self.available_count().await?,
        })
    }
}
