//! Durable lease records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use browserhub_core::result::AppResult;
use browserhub_core::types::RoomId;
use browserhub_entity::lease::VirtualBrowserLease;

/// Storage for virtual browser leases, keyed by room.
#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find the lease held by a room.
    async fn get(&self, room_id: RoomId) -> AppResult<Option<VirtualBrowserLease>>;

    /// Store a new lease unless the room or the container already has one.
    ///
    /// Returns `false` without writing anything on conflict.
    async fn create(&self, lease: &VirtualBrowserLease) -> AppResult<bool>;

    /// Overwrite an existing lease record.
    async fn update(&self, lease: &VirtualBrowserLease) -> AppResult<()>;

    /// Delete a room's lease. Returns `true` if a record was removed.
    async fn delete(&self, room_id: RoomId) -> AppResult<bool>;

    /// Leases whose `expires_at` is at or before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<VirtualBrowserLease>>;

    /// Every stored lease.
    async fn list_all(&self) -> AppResult<Vec<VirtualBrowserLease>>;
}
