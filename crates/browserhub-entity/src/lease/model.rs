//! Lease entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use browserhub_core::types::{ContainerId, RoomId};

use crate::container::ContainerInfo;

/// Lease lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    /// The room holds the container.
    Allocated,
    /// The lease was given up or expired.
    Released,
}

/// An exclusive, time-bounded allocation of one container to one room.
///
/// At most one active lease exists per room and per container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualBrowserLease {
    /// Unique lease identifier.
    pub id: Uuid,
    /// The room holding the lease.
    pub room_id: RoomId,
    /// The leased container.
    pub container_id: ContainerId,
    /// Address the room's clients connect to.
    pub container_url: String,
    /// When the lease was granted.
    pub allocated_at: DateTime<Utc>,
    /// When the lease lapses.
    pub expires_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: LeaseStatus,
}

impl VirtualBrowserLease {
    /// Grant a new lease on `container` starting at `now`.
    pub fn grant(
        room_id: RoomId,
        container: &ContainerInfo,
        now: DateTime<Utc>,
        duration: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            container_id: container.id.clone(),
            container_url: container.url.clone(),
            allocated_at: now,
            expires_at: now + duration,
            status: LeaseStatus::Allocated,
        }
    }

    /// Whether the lease still entitles the room to its container at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == LeaseStatus::Allocated && self.expires_at > now
    }

    /// Whether the lease is due for the expiry sweep at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whole seconds of lease time left, never negative.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}
