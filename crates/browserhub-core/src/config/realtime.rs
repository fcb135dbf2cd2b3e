//! Realtime notification configuration.

use serde::{Deserialize, Serialize};

/// Realtime channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Buffer size of each in-process broadcast channel.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// Prefix of the Redis pub/sub channels events are published on.
    #[serde(default = "default_channel_prefix")]
    pub redis_channel_prefix: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
            redis_channel_prefix: default_channel_prefix(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}

fn default_channel_prefix() -> String {
    "browserhub:events".to_string()
}
