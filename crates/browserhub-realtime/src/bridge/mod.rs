//! Cross-node delivery of realtime events.

#[cfg(feature = "redis-pubsub")]
pub mod redis_pubsub;

#[cfg(feature = "redis-pubsub")]
pub use redis_pubsub::{RedisEventRelay, RedisNotifier};
