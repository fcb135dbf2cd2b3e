//! # browserhub-realtime
//!
//! Delivers scheduler events to rooms and connections.
//!
//! - [`RealtimeHub`]: in-process broadcast channels per room and per
//!   connection; implements the scheduler's `Notifier` port directly
//! - `RedisNotifier` / `RedisEventRelay` (feature `redis-pubsub`): publish
//!   on one node, fan out to the hub of every node

pub mod bridge;
pub mod hub;
pub mod message;

pub use hub::RealtimeHub;
pub use message::{MessageEnvelope, Target};
