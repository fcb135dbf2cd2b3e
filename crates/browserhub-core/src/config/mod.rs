//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Every field carries a serde default, so an empty file
//! yields the reference scheduling policy.

pub mod backend;
pub mod cache;
pub mod logging;
pub mod realtime;
pub mod runtime;
pub mod scheduler;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::backend::{BackendConfig, BackendKind};
pub use self::cache::{CacheConfig, RedisCacheConfig};
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::runtime::{ContainerSpec, RuntimeConfig};
pub use self::scheduler::SchedulerConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lease, queue and cooldown policy.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Which storage backend holds pool, queue and lease state.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Shared cache (Redis) settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Container runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Realtime notification settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Maintenance worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `BROWSERHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BROWSERHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an inline TOML string.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
