//! In-memory container pool using a Tokio mutex for single-node deployments.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use browserhub_core::result::AppResult;
use browserhub_core::types::ContainerId;
use browserhub_entity::container::ContainerHandle;

use super::ContainerPool;

/// Internal slot bookkeeping.
#[derive(Debug, Default)]
struct Slots {
    /// Every container the pool manages.
    all: BTreeSet<ContainerId>,
    /// Containers not currently claimed.
    free: BTreeSet<ContainerId>,
}

/// In-memory container pool.
///
/// Suitable for single-node deployments only.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainerPool {
    /// Protected slot state.
    slots: Arc<Mutex<Slots>>,
}

impl MemoryContainerPool {
    /// Creates a pool where every container starts free.
    pub fn new(containers: impl IntoIterator<Item = ContainerId>) -> Self {
        let all: BTreeSet<ContainerId> = containers.into_iter().collect();
        Self {
            slots: Arc::new(Mutex::new(Slots {
                free: all.clone(),
                all,
            })),
        }
    }
}

#[async_trait]
impl ContainerPool for MemoryContainerPool {
    async fn try_allocate(&self) -> AppResult<Option<ContainerHandle>> {
        let mut slots = self.slots.lock().await;

        let Some(container_id) = slots.free.pop_first() else {
            debug!(capacity = slots.all.len(), "No free container slot");
            return Ok(None);
        };

        info!(
            container_id = %container_id,
            available = slots.free.len(),
            "Container slot claimed"
        );
        Ok(Some(ContainerHandle::new(container_id)))
    }

    async fn release(&self, container_id: &ContainerId) -> AppResult<bool> {
        let mut slots = self.slots.lock().await;

        if !slots.all.contains(container_id) {
            warn!(container_id = %container_id, "Attempted to return unknown container");
            return Ok(false);
        }

        let freed = slots.free.insert(container_id.clone());
        if freed {
            info!(
                container_id = %container_id,
                available = slots.free.len(),
                "Container slot returned"
            );
        } else {
            debug!(container_id = %container_id, "Container slot already free");
        }
        Ok(freed)
    }

    async fn available_count(&self) -> AppResult<u32> {
        Ok(self.slots.lock().await.free.len() as u32)
    }

    async fn capacity(&self) -> AppResult<u32> {
        Ok(self.slots.lock().await.all.len() as u32)
    }

    async fn seed(&self, containers: &[ContainerId], held: &[ContainerId]) -> AppResult<()> {
        let mut slots = self.slots.lock().await;
        slots.all = containers.iter().cloned().collect();
        slots.free = slots
            .all
            .iter()
            .filter(|id| !held.contains(id))
            .cloned()
            .collect();

        info!(
            capacity = slots.all.len(),
            available = slots.free.len(),
            "Container pool seeded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn ids(names: &[&str]) -> Vec<ContainerId> {
        names.iter().map(|n| ContainerId::from(*n)).collect()
    }

    #[tokio::test]
    async fn test_allocate_until_exhausted() {
        let pool = MemoryContainerPool::new(ids(&["a", "b"]));

        let first = pool.try_allocate().await.unwrap().unwrap();
        let second = pool.try_allocate().await.unwrap().unwrap();
        assert_ne!(first, second);
        assert!(pool.try_allocate().await.unwrap().is_none());
        assert_eq!(pool.available_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let pool = MemoryContainerPool::new(ids(&["a"]));
        let handle = pool.try_allocate().await.unwrap().unwrap();

        assert!(pool.release(&handle.container_id).await.unwrap());
        assert!(!pool.release(&handle.container_id).await.unwrap());
        assert_eq!(pool.available_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_container_is_not_added() {
        let pool = MemoryContainerPool::new(ids(&["a"]));
        assert!(!pool.release(&ContainerId::from("ghost")).await.unwrap());
        assert_eq!(pool.capacity().await.unwrap(), 1);
        assert_eq!(pool.available_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seed_marks_held_slots() {
        let pool = MemoryContainerPool::default();
        pool.seed(&ids(&["a", "b", "c"]), &ids(&["b", "zzz"]))
            .await
            .unwrap();

        let status = pool.status().await.unwrap();
        assert_eq!(status.capacity, 3);
        assert_eq!(status.available, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_share_a_slot() {
        let pool = MemoryContainerPool::new(ids(&["a", "b", "c"]));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move { pool.try_allocate().await.unwrap() }));
        }

        let mut claimed = HashSet::new();
        for task in tasks {
            if let Some(handle) = task.await.unwrap() {
                assert!(claimed.insert(handle.container_id));
            }
        }
        assert_eq!(claimed.len(), 3);
        assert_eq!(pool.available_count().await.unwrap(), 0);
    }
}
