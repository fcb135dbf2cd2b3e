//! In-memory queue store for single-node deployments.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use browserhub_core::result::AppResult;

use super::state::QueueState;
use super::store::{QueueGuard, QueueStore};

/// Queue state behind a process-wide async mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    state: Arc<Mutex<QueueState>>,
}

impl MemoryQueueStore {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn lock(&self) -> AppResult<Box<dyn QueueGuard>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryQueueGuard {
            guard: Some(guard),
            working,
        }))
    }

    async fn snapshot(&self) -> AppResult<QueueState> {
        Ok(self.state.lock().await.clone())
    }
}

struct MemoryQueueGuard {
    guard: Option<OwnedMutexGuard<QueueState>>,
    working: QueueState,
}

#[async_trait]
impl QueueGuard for MemoryQueueGuard {
    fn state(&mut self) -> &mut QueueState {
        &mut self.working
    }

    async fn commit(&mut self) -> AppResult<()> {
        if let Some(mut guard) = self.guard.take() {
            *guard = std::mem::take(&mut self.working);
        }
        Ok(())
    }

    async fn release(&mut self) -> AppResult<()> {
        self.guard = None;
        Ok(())
    }
}
