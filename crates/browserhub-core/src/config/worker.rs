//! Maintenance worker configuration.

use serde::{Deserialize, Serialize};

/// Maintenance sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the maintenance runner is started.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between maintenance sweeps.
    #[serde(default = "default_interval")]
    pub maintenance_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maintenance_interval_seconds: default_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}
