//! Storage backend selection.

use serde::{Deserialize, Serialize};

/// Where pool, queue, lease and room state live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Process-local state. Single node only.
    #[default]
    Memory,
    /// State shared through Redis. Safe across nodes.
    Redis,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

/// Backend configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Selected backend.
    #[serde(default)]
    pub kind: BackendKind,
}
