//! # browserhub-cache
//!
//! Shared-cache plumbing for the distributed BrowserHub deployment:
//!
//! - **redis**: connection management via the [redis](https://crates.io/crates/redis)
//!   connection manager, with key prefixing
//! - **keys**: every key the Redis backends read or write
//!
//! The process-local deployment does not touch this crate at runtime.

pub mod keys;
pub mod redis;

pub use self::redis::RedisClient;
