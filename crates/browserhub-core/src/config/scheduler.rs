//! Virtual browser scheduling policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lease, notification and cooldown durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long a lease lasts before the expiry sweep reclaims it.
    #[serde(default = "default_session_duration")]
    pub session_duration_minutes: u64,
    /// How long a notified room has to accept or decline.
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_seconds: u64,
    /// Mandatory wait after a release before the room may request again.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    /// Delay between a release and the container going back to the pool.
    #[serde(default = "default_release_grace")]
    pub release_grace_seconds: u64,
}

impl SchedulerConfig {
    /// Lease length.
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_minutes * 60)
    }

    /// Time a notification stays valid.
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_seconds)
    }

    /// Post-release cooldown window.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Grace delay before a released container is reused.
    pub fn release_grace(&self) -> Duration {
        Duration::from_secs(self.release_grace_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            session_duration_minutes: default_session_duration(),
            notification_timeout_seconds: default_notification_timeout(),
            cooldown_seconds: default_cooldown(),
            release_grace_seconds: default_release_grace(),
        }
    }
}

fn default_session_duration() -> u64 {
    180
}

fn default_notification_timeout() -> u64 {
    120
}

fn default_cooldown() -> u64 {
    300
}

fn default_release_grace() -> u64 {
    2
}
