//! In-process fan-out of events to rooms and connections.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, RoomId};
use browserhub_entity::event::BrowserEvent;
use browserhub_scheduler::ports::Notifier;

use crate::message::{MessageEnvelope, Target};

/// Broadcast channels per room and per connected client.
///
/// Room channels are created on first subscription and dropped once the
/// last receiver is gone. A connection is reachable between
/// [`RealtimeHub::connect`] and [`RealtimeHub::disconnect`].
#[derive(Debug)]
pub struct RealtimeHub {
    /// Room → broadcast sender
    rooms: DashMap<RoomId, broadcast::Sender<MessageEnvelope>>,
    /// Connection → broadcast sender
    connections: DashMap<ConnectionId, broadcast::Sender<MessageEnvelope>>,
    /// Buffer size for new channels
    buffer_size: usize,
}

impl RealtimeHub {
    /// Create a hub whose channels buffer `buffer_size` messages.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Receive every event broadcast to a room.
    pub fn subscribe_room(&self, room_id: RoomId) -> broadcast::Receiver<MessageEnvelope> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Register a client connection and receive its direct events.
    pub fn connect(&self, connection_id: ConnectionId) -> broadcast::Receiver<MessageEnvelope> {
        debug!(connection_id = %connection_id, "Realtime connection registered");
        self.connections
            .entry(connection_id)
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Forget a client connection.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_some() {
            debug!(connection_id = %connection_id, "Realtime connection removed");
        }
    }

    /// Whether a connection is registered on this node.
    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Hand an envelope to local receivers. Returns how many got it.
    pub fn deliver(&self, envelope: MessageEnvelope) -> usize {
        match envelope.target {
            Target::Room(room_id) => {
                let Some(tx) = self.rooms.get(&room_id).map(|tx| tx.clone()) else {
                    trace!(room_id = %room_id, "No local listeners for room");
                    return 0;
                };
                match tx.send(envelope) {
                    Ok(count) => count,
                    Err(_) => {
                        self.rooms
                            .remove_if(&room_id, |_, tx| tx.receiver_count() == 0);
                        0
                    }
                }
            }
            Target::Connection(connection_id) => {
                let Some(tx) = self.connections.get(&connection_id).map(|tx| tx.clone()) else {
                    return 0;
                };
                tx.send(envelope).unwrap_or(0)
            }
        }
    }

    /// Number of rooms with at least one local channel.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for RealtimeHub {
    async fn send_to_room(&self, room_id: RoomId, event: &BrowserEvent) -> AppResult<()> {
        let delivered = self.deliver(MessageEnvelope::new(Target::Room(room_id), event.clone()));
        debug!(room_id = %room_id, event = event.name(), delivered, "Room event sent");
        Ok(())
    }

    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: &BrowserEvent,
    ) -> AppResult<bool> {
        if !self.is_connected(connection_id) {
            return Ok(false);
        }
        self.deliver(MessageEnvelope::new(
            Target::Connection(connection_id),
            event.clone(),
        ));
        Ok(true)
    }
}
