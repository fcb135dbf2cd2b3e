//! Storage primitives behind the admission queue.

use async_trait::async_trait;

use browserhub_core::result::AppResult;

use super::state::QueueState;

/// Exclusive access to the queue snapshot.
///
/// [`QueueStore::lock`] returns a guard holding a working copy of the
/// state. Nothing is visible to other callers until [`QueueGuard::commit`]
/// succeeds. A guard must be finished with either `commit` or `release`.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Take the queue lock and load the current state.
    async fn lock(&self) -> AppResult<Box<dyn QueueGuard>>;

    /// Read the current state without taking the lock.
    async fn snapshot(&self) -> AppResult<QueueState>;
}

/// A held queue lock with its working copy.
#[async_trait]
pub trait QueueGuard: Send {
    /// The working copy.
    fn state(&mut self) -> &mut QueueState;

    /// Publish the working copy and drop the lock.
    async fn commit(&mut self) -> AppResult<()>;

    /// Drop the lock, discarding the working copy.
    async fn release(&mut self) -> AppResult<()>;
}
