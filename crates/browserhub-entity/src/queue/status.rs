//! Queue status as reported to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use browserhub_core::types::RoomId;

use super::entry::{QueueEntry, QueueEntryStatus};
use super::notification::NotificationEntry;

/// Public view of one room's place in the admission queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusView {
    /// The room.
    pub room_id: RoomId,
    /// Rank among waiting rooms (frozen once notified).
    pub position: u32,
    /// Waiting or notified.
    pub status: QueueEntryStatus,
    /// When the room asked for a browser.
    pub requested_at: DateTime<Utc>,
    /// When the offer was made, if notified.
    pub notified_at: Option<DateTime<Utc>>,
    /// When the offer lapses, if notified.
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds left to respond, if notified.
    pub remaining_seconds: Option<i64>,
}

impl QueueStatusView {
    /// Build the view from an entry and its optional notification.
    pub fn from_entry(
        entry: &QueueEntry,
        notification: Option<&NotificationEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id: entry.room_id,
            position: entry.position,
            status: entry.status,
            requested_at: entry.requested_at,
            notified_at: notification.map(|n| n.notified_at),
            expires_at: notification.map(|n| n.expires_at),
            remaining_seconds: notification.map(|n| n.remaining_seconds(now)),
        }
    }
}
