//! Redis pub/sub bridge for multi-node deployments.
//!
//! Every node publishes events with [`RedisNotifier`] and runs one
//! [`RedisEventRelay`] that feeds messages for all targets into its local
//! [`RealtimeHub`]. Connections register themselves in a shared set so a
//! direct send can tell whether the connection exists anywhere.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use browserhub_cache::RedisClient;
use browserhub_cache::keys;
use browserhub_core::error::{AppError, ErrorKind};
use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, RoomId};
use browserhub_entity::event::BrowserEvent;
use browserhub_scheduler::ports::Notifier;

use crate::hub::RealtimeHub;
use crate::message::{MessageEnvelope, Target};

/// Publishes events on Redis channels.
#[derive(Debug, Clone)]
pub struct RedisNotifier {
    client: RedisClient,
    channel_prefix: String,
}

impl RedisNotifier {
    /// Creates a notifier publishing under `channel_prefix`.
    pub fn new(client: RedisClient, channel_prefix: impl Into<String>) -> Self {
        Self {
            client,
            channel_prefix: channel_prefix.into(),
        }
    }

    fn connections_key(&self) -> String {
        self.client.prefixed_key(&keys::realtime_connections())
    }

    /// Mark a connection as live cluster-wide.
    pub async fn register_connection(&self, connection_id: ConnectionId) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: i64 = redis::cmd("SADD")
            .arg(self.connections_key())
            .arg(connection_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove a connection from the live set.
    pub async fn unregister_connection(&self, connection_id: ConnectionId) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: i64 = redis::cmd("SREM")
            .arg(self.connections_key())
            .arg(connection_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn publish(&self, envelope: &MessageEnvelope) -> AppResult<i64> {
        let channel = envelope.target.channel_name(&self.channel_prefix);
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.client.conn_mut();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!(channel = %channel, receivers, "Published realtime event");
        Ok(receivers)
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn send_to_room(&self, room_id: RoomId, event: &BrowserEvent) -> AppResult<()> {
        self.publish(&MessageEnvelope::new(Target::Room(room_id), event.clone()))
            .await?;
        Ok(())
    }

    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: &BrowserEvent,
    ) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let live: bool = redis::cmd("SISMEMBER")
            .arg(self.connections_key())
            .arg(connection_id.to_string())
            .query_async(&mut conn)
            .await?;
        if !live {
            return Ok(false);
        }

        let receivers = self
            .publish(&MessageEnvelope::new(
                Target::Connection(connection_id),
                event.clone(),
            ))
            .await?;
        Ok(receivers > 0)
    }
}

/// Subscribes to every event channel and feeds the local hub.
#[derive(Debug, Clone)]
pub struct RedisEventRelay {
    url: String,
    channel_prefix: String,
    hub: Arc<RealtimeHub>,
}

impl RedisEventRelay {
    /// Creates a relay for the Redis server at `url`.
    pub fn new(url: &str, channel_prefix: impl Into<String>, hub: Arc<RealtimeHub>) -> Self {
        Self {
            url: url.to_string(),
            channel_prefix: channel_prefix.into(),
            hub,
        }
    }

    /// Relay messages until `shutdown` flips to `true` or the
    /// subscription ends.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let client = redis::Client::open(self.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to create Redis client", e)
        })?;
        let mut pubsub = client.get_async_pubsub().await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to open Redis subscription", e)
        })?;

        let pattern = format!("{}:*", self.channel_prefix);
        pubsub.psubscribe(&pattern).await?;
        info!(pattern = %pattern, "Realtime relay subscribed");

        let mut messages = Box::pin(pubsub.on_message());
        loop {
            tokio::select! {
                message = messages.next() => {
                    let Some(message) = message else {
                        warn!("Realtime relay subscription closed");
                        return Ok(());
                    };
                    let payload: String = match message.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            error!(error = %e, "Unreadable realtime payload");
                            continue;
                        }
                    };
                    self.relay(message.get_channel_name(), &payload);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Realtime relay stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Deliver one raw pub/sub message to the local hub. Returns the
    /// number of local receivers.
    pub fn relay(&self, channel: &str, payload: &str) -> usize {
        if Target::from_channel_name(&self.channel_prefix, channel).is_none() {
            debug!(channel = %channel, "Ignoring message on unknown channel");
            return 0;
        }
        match serde_json::from_str::<MessageEnvelope>(payload) {
            Ok(envelope) => self.hub.deliver(envelope),
            Err(e) => {
                error!(channel = %channel, error = %e, "Malformed realtime message");
                0
            }
        }
    }
}
