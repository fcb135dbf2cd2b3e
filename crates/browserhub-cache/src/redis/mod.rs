//! Redis connection.

pub mod client;

pub use client::RedisClient;
