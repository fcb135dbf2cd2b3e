//! Fair FIFO admission queue.
//!
//! Rooms that cannot be served immediately wait here. When a slot frees
//! up, the earliest waiting room is *notified* and has a bounded time to
//! accept; on expiry it returns to its original place in line.
//!
//! Backends:
//! - [`MemoryQueueStore`]: process-wide async mutex
//! - `RedisQueueStore`: token lock plus JSON snapshot (feature `redis-backend`)

pub mod admission;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod state;
pub mod store;

pub use admission::{Admission, AdmissionQueue};
pub use memory::MemoryQueueStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisQueueStore;
pub use state::{Enqueued, QueueState};
pub use store::{QueueGuard, QueueStore};
