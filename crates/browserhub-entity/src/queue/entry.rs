//! Queue entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use browserhub_core::types::RoomId;

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    /// Waiting for a container.
    Waiting,
    /// Offered a container and expected to accept or decline.
    Notified,
}

impl std::fmt::Display for QueueEntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Notified => write!(f, "notified"),
        }
    }
}

/// One room waiting for, or holding an offer on, a virtual browser.
///
/// A room has at most one entry. `position` is the 1-based rank among
/// waiting entries; a notified entry keeps the rank it had when notified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// The waiting room.
    pub room_id: RoomId,
    /// When the room asked for a browser. Defines fairness order.
    pub requested_at: DateTime<Utc>,
    /// Rank among waiting entries.
    pub position: u32,
    /// Current lifecycle state.
    pub status: QueueEntryStatus,
}

impl QueueEntry {
    /// Create a waiting entry.
    pub fn waiting(room_id: RoomId, requested_at: DateTime<Utc>, position: u32) -> Self {
        Self {
            room_id,
            requested_at,
            position,
            status: QueueEntryStatus::Waiting,
        }
    }

    /// Whether the entry is still waiting in line.
    pub fn is_waiting(&self) -> bool {
        self.status == QueueEntryStatus::Waiting
    }

    /// Whether the entry holds an outstanding offer.
    pub fn is_notified(&self) -> bool {
        self.status == QueueEntryStatus::Notified
    }
}
