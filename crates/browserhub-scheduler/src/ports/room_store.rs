//! Per-room metadata the scheduler reads and writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, RoomId};

/// Room metadata: the cooldown anchor and the controlling connection.
#[async_trait]
pub trait RoomStore: Send + Sync + std::fmt::Debug + 'static {
    /// When the room last gave up a lease.
    async fn last_released_at(&self, room_id: RoomId) -> AppResult<Option<DateTime<Utc>>>;

    /// Record a release, starting the room's cooldown.
    async fn set_last_released_at(&self, room_id: RoomId, at: DateTime<Utc>) -> AppResult<()>;

    /// The connection currently designated as the room's controller.
    async fn controller_connection(&self, room_id: RoomId) -> AppResult<Option<ConnectionId>>;

    /// Designate (or clear) the room's controller connection.
    async fn set_controller_connection(
        &self,
        room_id: RoomId,
        connection_id: Option<ConnectionId>,
    ) -> AppResult<()>;
}
