//! Time-boxed queue notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use browserhub_core::types::RoomId;

/// An outstanding offer of a container to a notified room.
///
/// Exists if and only if the room's queue entry is `Notified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    /// The notified room.
    pub room_id: RoomId,
    /// When the offer was made.
    pub notified_at: DateTime<Utc>,
    /// When the offer lapses.
    pub expires_at: DateTime<Utc>,
}

impl NotificationEntry {
    /// Create a notification valid for `timeout` from `now`.
    pub fn new(room_id: RoomId, now: DateTime<Utc>, timeout: chrono::Duration) -> Self {
        Self {
            room_id,
            notified_at: now,
            expires_at: now + timeout,
        }
    }

    /// Whether the offer has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whole seconds left before the offer lapses, never negative.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let entry = NotificationEntry::new(RoomId::new(), now, chrono::Duration::seconds(120));
        assert!(!entry.is_expired(now + chrono::Duration::seconds(119)));
        assert!(entry.is_expired(now + chrono::Duration::seconds(120)));
        assert_eq!(entry.remaining_seconds(now + chrono::Duration::seconds(200)), 0);
    }
}
