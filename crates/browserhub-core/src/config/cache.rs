//! Shared cache configuration.

use serde::{Deserialize, Serialize};

/// Top-level cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis-specific configuration.
    #[serde(default)]
    pub redis: RedisCacheConfig,
}

/// Redis backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all BrowserHub keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Expiry of the queue mutation lock in milliseconds.
    #[serde(default = "default_lock_ttl")]
    pub queue_lock_ttl_ms: u64,
    /// Pause between attempts to take the queue lock.
    #[serde(default = "default_lock_retry")]
    pub queue_lock_retry_ms: u64,
    /// Attempts before giving up on the queue lock.
    #[serde(default = "default_lock_attempts")]
    pub queue_lock_attempts: u32,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            queue_lock_ttl_ms: default_lock_ttl(),
            queue_lock_retry_ms: default_lock_retry(),
            queue_lock_attempts: default_lock_attempts(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "browserhub:".to_string()
}

fn default_lock_ttl() -> u64 {
    5000
}

fn default_lock_retry() -> u64 {
    25
}

fn default_lock_attempts() -> u32 {
    200
}
