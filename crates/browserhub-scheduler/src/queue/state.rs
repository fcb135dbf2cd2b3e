//! Admission queue state and its transition rules.
//!
//! [`QueueState`] is a plain value: every backend loads it, applies one of
//! these transitions under its lock, and stores it back. All fairness and
//! position rules therefore exist exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use browserhub_core::types::RoomId;
use browserhub_entity::queue::{
    NotificationEntry, QueueEntry, QueueEntryStatus, QueueStatusView,
};

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Rank of the room. `0` if the room already holds a notification.
    pub position: u32,
    /// Whether a new entry was created.
    pub created: bool,
}

/// Snapshot of every queue entry and outstanding notification.
///
/// Entries are kept sorted by `requested_at`; ties keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    entries: Vec<QueueEntry>,
    notifications: Vec<NotificationEntry>,
}

impl QueueState {
    /// The room's entry, if any.
    pub fn entry(&self, room_id: RoomId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.room_id == room_id)
    }

    /// The room's outstanding notification, if any.
    pub fn notification(&self, room_id: RoomId) -> Option<&NotificationEntry> {
        self.notifications.iter().find(|n| n.room_id == room_id)
    }

    /// Entries in waiting or notified state.
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Whether no room is waiting or notified.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rooms holding an outstanding offer.
    pub fn notified_count(&self) -> u32 {
        self.entries.iter().filter(|e| e.is_notified()).count() as u32
    }

    /// Add a room at the back of the line. Idempotent.
    pub fn enqueue(&mut self, room_id: RoomId, now: DateTime<Utc>) -> Enqueued {
        if let Some(existing) = self.entry(room_id) {
            let position = if existing.is_waiting() {
                existing.position
            } else {
                0
            };
            return Enqueued {
                position,
                created: false,
            };
        }

        let waiting = self.entries.iter().filter(|e| e.is_waiting()).count() as u32;
        self.entries
            .push(QueueEntry::waiting(room_id, now, waiting + 1));
        self.recompute_positions();

        let position = self.entry(room_id).map(|e| e.position).unwrap_or(0);
        Enqueued {
            position,
            created: true,
        }
    }

    /// The waiting room with the best rank.
    pub fn peek_next(&self) -> Option<RoomId> {
        self.entries
            .iter()
            .filter(|e| e.is_waiting())
            .min_by_key(|e| e.position)
            .map(|e| e.room_id)
    }

    /// Offer a container to a waiting room.
    ///
    /// Fails if the room is absent, not waiting, or already notified.
    pub fn notify(
        &mut self,
        room_id: RoomId,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> bool {
        if self.notification(room_id).is_some() {
            return false;
        }
        let Some(entry) = self.entries.iter_mut().find(|e| e.room_id == room_id) else {
            return false;
        };
        if !entry.is_waiting() {
            return false;
        }

        entry.status = QueueEntryStatus::Notified;
        self.notifications
            .push(NotificationEntry::new(room_id, now, timeout));
        self.recompute_positions();
        true
    }

    /// Notify the next waiting room, provided fewer offers are outstanding
    /// than there are free slots.
    pub fn notify_next(
        &mut self,
        free_slots: u32,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> Option<RoomId> {
        if self.notified_count() >= free_slots {
            return None;
        }
        let room_id = self.peek_next()?;
        self.notify(room_id, now, timeout).then_some(room_id)
    }

    /// Resolve a notified room by accepting the offer.
    pub fn accept(&mut self, room_id: RoomId) -> bool {
        self.resolve(room_id)
    }

    /// Resolve a notified room by declining. The room leaves the line.
    pub fn decline(&mut self, room_id: RoomId) -> bool {
        self.resolve(room_id)
    }

    /// Remove a room regardless of its state.
    pub fn remove(&mut self, room_id: RoomId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.room_id != room_id);
        self.notifications.retain(|n| n.room_id != room_id);
        if self.entries.len() == before {
            return false;
        }
        self.recompute_positions();
        true
    }

    /// Revert every lapsed offer to waiting. Returns the affected rooms.
    pub fn expire_notifications(&mut self, now: DateTime<Utc>) -> Vec<RoomId> {
        let expired: Vec<RoomId> = self
            .notifications
            .iter()
            .filter(|n| n.is_expired(now))
            .map(|n| n.room_id)
            .collect();
        if expired.is_empty() {
            return expired;
        }

        self.notifications.retain(|n| !n.is_expired(now));
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| expired.contains(&e.room_id))
        {
            entry.status = QueueEntryStatus::Waiting;
        }
        self.recompute_positions();
        expired
    }

    /// Public status of one room.
    pub fn status(&self, room_id: RoomId, now: DateTime<Utc>) -> Option<QueueStatusView> {
        let entry = self.entry(room_id)?;
        Some(QueueStatusView::from_entry(
            entry,
            self.notification(room_id),
            now,
        ))
    }

    /// Status of every room: notified rooms first, then waiting rooms by rank.
    pub fn all_statuses(&self, now: DateTime<Utc>) -> Vec<QueueStatusView> {
        let mut statuses: Vec<QueueStatusView> = self
            .entries
            .iter()
            .map(|e| QueueStatusView::from_entry(e, self.notification(e.room_id), now))
            .collect();
        statuses.sort_by_key(|s| (s.status == QueueEntryStatus::Waiting, s.position));
        statuses
    }

    /// Check the structural invariants. Returns a description of the first
    /// violation found.
    pub fn validate(&self) -> Result<(), String> {
        let mut positions: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| e.is_waiting())
            .map(|e| e.position)
            .collect();
        let ordered = positions.windows(2).all(|w| w[0] < w[1]);
        positions.sort_unstable();
        let dense = positions.iter().enumerate().all(|(i, p)| *p == i as u32 + 1);
        if !dense || !ordered {
            return Err(format!("waiting positions not 1..N in order: {positions:?}"));
        }

        for entry in &self.entries {
            let notified = self.notification(entry.room_id).is_some();
            if notified != entry.is_notified() {
                return Err(format!(
                    "room {} is {} but notification present = {notified}",
                    entry.room_id, entry.status
                ));
            }
        }
        if self.notifications.len() as u32 != self.notified_count() {
            return Err("notification without matching entry".to_string());
        }
        Ok(())
    }

    fn resolve(&mut self, room_id: RoomId) -> bool {
        match self.entry(room_id) {
            Some(entry) if entry.is_notified() => self.remove(room_id),
            _ => false,
        }
    }

    /// Rank waiting entries 1..N by `requested_at`. Notified entries keep
    /// the rank they were offered at.
    fn recompute_positions(&mut self) {
        self.entries.sort_by_key(|e| e.requested_at);
        let mut position = 0;
        for entry in self.entries.iter_mut().filter(|e| e.is_waiting()) {
            position += 1;
            entry.position = position;
        }
    }
}
