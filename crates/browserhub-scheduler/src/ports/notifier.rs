//! Realtime delivery of scheduler events.

use async_trait::async_trait;

use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, RoomId};
use browserhub_entity::event::BrowserEvent;

/// Pushes [`BrowserEvent`]s to connected clients.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug + 'static {
    /// Send an event to every connection in a room.
    async fn send_to_room(&self, room_id: RoomId, event: &BrowserEvent) -> AppResult<()>;

    /// Send an event to one connection.
    ///
    /// Returns `false` if the connection is not reachable.
    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: &BrowserEvent,
    ) -> AppResult<bool>;
}
