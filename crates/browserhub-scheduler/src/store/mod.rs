//! Lease and room metadata backends.

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::{MemoryLeaseStore, MemoryRoomStore};
#[cfg(feature = "redis-backend")]
pub use self::redis::{RedisLeaseStore, RedisRoomStore};
