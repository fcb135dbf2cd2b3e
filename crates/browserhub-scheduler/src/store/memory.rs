//! Process-local lease and room stores.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;

use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, ContainerId, RoomId};
use browserhub_entity::lease::VirtualBrowserLease;

use crate::ports::{LeaseStore, RoomStore};

#[derive(Debug, Default)]
struct Leases {
    by_room: HashMap<RoomId, VirtualBrowserLease>,
    by_container: HashMap<ContainerId, RoomId>,
}

/// Leases indexed by room and by container under one lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    inner: Arc<RwLock<Leases>>,
}

impl MemoryLeaseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn get(&self, room_id: RoomId) -> AppResult<Option<VirtualBrowserLease>> {
        Ok(self.inner.read().await.by_room.get(&room_id).cloned())
    }

    async fn create(&self, lease: &VirtualBrowserLease) -> AppResult<bool> {
        let mut leases = self.inner.write().await;
        if leases.by_room.contains_key(&lease.room_id)
            || leases.by_container.contains_key(&lease.container_id)
        {
            debug!(
                room_id = %lease.room_id,
                container_id = %lease.container_id,
                "Lease already exists for room or container"
            );
            return Ok(false);
        }

        leases
            .by_container
            .insert(lease.container_id.clone(), lease.room_id);
        leases.by_room.insert(lease.room_id, lease.clone());
        Ok(true)
    }

    async fn update(&self, lease: &VirtualBrowserLease) -> AppResult<()> {
        let mut leases = self.inner.write().await;
        if let Some(previous) = leases.by_room.insert(lease.room_id, lease.clone()) {
            if previous.container_id != lease.container_id {
                leases.by_container.remove(&previous.container_id);
            }
        }
        leases
            .by_container
            .insert(lease.container_id.clone(), lease.room_id);
        Ok(())
    }

    async fn delete(&self, room_id: RoomId) -> AppResult<bool> {
        let mut leases = self.inner.write().await;
        match leases.by_room.remove(&room_id) {
            Some(lease) => {
                leases.by_container.remove(&lease.container_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<VirtualBrowserLease>> {
        let leases = self.inner.read().await;
        let mut expired: Vec<VirtualBrowserLease> = leases
            .by_room
            .values()
            .filter(|l| l.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|l| l.expires_at);
        Ok(expired)
    }

    async fn list_all(&self) -> AppResult<Vec<VirtualBrowserLease>> {
        let leases = self.inner.read().await;
        let mut all: Vec<VirtualBrowserLease> = leases.by_room.values().cloned().collect();
        all.sort_by_key(|l| l.allocated_at);
        Ok(all)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RoomRecord {
    last_released_at: Option<DateTime<Utc>>,
    controller: Option<ConnectionId>,
}

/// Room metadata in a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<RoomId, RoomRecord>>,
}

impl MemoryRoomStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn last_released_at(&self, room_id: RoomId) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.rooms.get(&room_id).and_then(|r| r.last_released_at))
    }

    async fn set_last_released_at(&self, room_id: RoomId, at: DateTime<Utc>) -> AppResult<()> {
        self.rooms.entry(room_id).or_default().last_released_at = Some(at);
        Ok(())
    }

    async fn controller_connection(&self, room_id: RoomId) -> AppResult<Option<ConnectionId>> {
        Ok(self.rooms.get(&room_id).and_then(|r| r.controller))
    }

    async fn set_controller_connection(
        &self,
        room_id: RoomId,
        connection_id: Option<ConnectionId>,
    ) -> AppResult<()> {
        self.rooms.entry(room_id).or_default().controller = connection_id;
        Ok(())
    }
}
