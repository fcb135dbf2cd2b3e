//! Post-release cooldown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a room may request a browser yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStatus {
    /// Whether the cooldown window is still open.
    pub active: bool,
    /// Whole seconds left, rounded up. Zero when inactive.
    pub remaining_seconds: u64,
    /// When the room may request again, if a release was ever recorded.
    pub available_at: Option<DateTime<Utc>>,
}

impl CooldownStatus {
    /// Compute cooldown state from the room's last release.
    pub fn evaluate(
        last_released_at: Option<DateTime<Utc>>,
        cooldown: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(released) = last_released_at else {
            return Self {
                active: false,
                remaining_seconds: 0,
                available_at: None,
            };
        };

        let available_at = released + cooldown;
        if now >= available_at {
            return Self {
                active: false,
                remaining_seconds: 0,
                available_at: Some(available_at),
            };
        }

        let remaining_ms = (available_at - now).num_milliseconds().max(0) as u64;
        Self {
            active: true,
            remaining_seconds: remaining_ms.div_ceil(1000),
            available_at: Some(available_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_released_is_inactive() {
        let status = CooldownStatus::evaluate(None, chrono::Duration::seconds(300), Utc::now());
        assert!(!status.active);
        assert_eq!(status.available_at, None);
    }

    #[test]
    fn test_remaining_rounds_up() {
        let released = Utc::now();
        let now = released + chrono::Duration::milliseconds(299_500);
        let status = CooldownStatus::evaluate(Some(released), chrono::Duration::seconds(300), now);
        assert!(status.active);
        assert_eq!(status.remaining_seconds, 1);
    }

    #[test]
    fn test_window_closes_at_boundary() {
        let released = Utc::now();
        let now = released + chrono::Duration::seconds(300);
        let status = CooldownStatus::evaluate(Some(released), chrono::Duration::seconds(300), now);
        assert!(!status.active);
        assert_eq!(status.remaining_seconds, 0);
    }
}
