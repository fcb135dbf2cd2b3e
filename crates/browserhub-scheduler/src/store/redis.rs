//! Redis lease and room stores for multi-node deployments.
//!
//! Scripts only touch keys passed in KEYS. On Redis Cluster the lease keys
//! must share a slot, so give `key_prefix` a hash tag such as `{browserhub}:`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use browserhub_cache::RedisClient;
use browserhub_cache::keys;
use browserhub_core::error::AppError;
use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, ContainerId, RoomId};
use browserhub_entity::lease::VirtualBrowserLease;

use crate::ports::{LeaseStore, RoomStore};

/// Lua script that stores a lease unless the room or container has one.
///
/// KEYS[1] = lease by room
/// KEYS[2] = lease by container
/// KEYS[3] = lease index
/// ARGV[1] = lease JSON
/// ARGV[2] = room id
///
/// Returns 1 if stored, 0 on conflict.
const CREATE_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 1 or redis.call('EXISTS', KEYS[2]) == 1 then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[1])
    redis.call('SET', KEYS[2], ARGV[2])
    redis.call('SADD', KEYS[3], ARGV[2])
    return 1
"#;

/// Lua script that overwrites a lease and moves its container index.
///
/// KEYS[1] = lease by room
/// KEYS[2] = lease by container (new)
/// KEYS[3] = lease index
/// KEYS[4] = lease by container (previous, same as KEYS[2] when unchanged)
/// ARGV[1] = lease JSON
/// ARGV[2] = room id
/// ARGV[3] = lease JSON read before the call, empty if there was none
///
/// Returns 1 if written, 0 if the record changed since it was read.
const UPDATE_SCRIPT: &str = r#"
    local current = redis.call('GET', KEYS[1]) or ''
    if current ~= ARGV[3] then
        return 0
    end
    if KEYS[4] ~= KEYS[2] then
        redis.call('DEL', KEYS[4])
    end
    redis.call('SET', KEYS[1], ARGV[1])
    redis.call('SET', KEYS[2], ARGV[2])
    redis.call('SADD', KEYS[3], ARGV[2])
    return 1
"#;

/// Lua script that deletes a lease and its indexes.
///
/// KEYS[1] = lease by room
/// KEYS[2] = lease index
/// KEYS[3] = lease by container
/// ARGV[1] = room id
/// ARGV[2] = lease JSON read before the call
///
/// Returns 1 if removed, 0 if the record changed since it was read.
const DELETE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) ~= ARGV[2] then
        return 0
    end
    redis.call('DEL', KEYS[1])
    redis.call('DEL', KEYS[3])
    redis.call('SREM', KEYS[2], ARGV[1])
    return 1
"#;

/// Attempts at a read-then-swap before giving up on a contended lease.
const SWAP_ATTEMPTS: usize = 5;

/// Container a stored lease record points at.
fn stored_container(raw: &str) -> AppResult<ContainerId> {
    let lease: VirtualBrowserLease = serde_json::from_str(raw)?;
    Ok(lease.container_id)
}

/// Leases stored as JSON records with room and container indexes.
#[derive(Debug, Clone)]
pub struct RedisLeaseStore {
    client: RedisClient,
}

impl RedisLeaseStore {
    /// Creates a store over an existing connection.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn room_key(&self, room_id: RoomId) -> String {
        self.client.prefixed_key(&keys::lease_by_room(room_id))
    }

    fn index_key(&self) -> String {
        self.client.prefixed_key(&keys::lease_index())
    }

    fn container_key(&self, container_id: &ContainerId) -> String {
        self.client
            .prefixed_key(&keys::lease_by_container(container_id))
    }

    async fn get_raw(&self, room_id: RoomId) -> AppResult<Option<String>> {
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.room_key(room_id))
            .query_async(&mut conn)
            .await?;
        Ok(raw)
    }

    async fn load_all(&self) -> AppResult<Vec<VirtualBrowserLease>> {
        let mut conn = self.client.conn_mut();
        let rooms: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.index_key())
            .query_async(&mut conn)
            .await?;
        if rooms.is_empty() {
            return Ok(Vec::new());
        }

        let lease_keys: Vec<String> = rooms
            .iter()
            .map(|room| {
                self.client
                    .prefixed_key(&format!("{}{room}", keys::lease_by_room_prefix()))
            })
            .collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&lease_keys)
            .query_async(&mut conn)
            .await?;

        let mut leases = Vec::with_capacity(raw.len());
        for (room, json) in rooms.iter().zip(raw) {
            match json {
                Some(json) => leases.push(serde_json::from_str(&json)?),
                None => debug!(room_id = %room, "Lease index points at a missing record"),
            }
        }
        Ok(leases)
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn get(&self, room_id: RoomId) -> AppResult<Option<VirtualBrowserLease>> {
        let raw = self.get_raw(room_id).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn create(&self, lease: &VirtualBrowserLease) -> AppResult<bool> {
        let json = serde_json::to_string(lease)?;
        let mut conn = self.client.conn_mut();
        let created: i64 = redis::Script::new(CREATE_SCRIPT)
            .key(self.room_key(lease.room_id))
            .key(self.container_key(&lease.container_id))
            .key(self.index_key())
            .arg(json)
            .arg(lease.room_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(created == 1)
    }

    async fn update(&self, lease: &VirtualBrowserLease) -> AppResult<()> {
        let json = serde_json::to_string(lease)?;
        let new_key = self.container_key(&lease.container_id);

        for _ in 0..SWAP_ATTEMPTS {
            let previous = self.get_raw(lease.room_id).await?;
            let old_key = match &previous {
                Some(raw) => self.container_key(&stored_container(raw)?),
                None => new_key.clone(),
            };

            let mut conn = self.client.conn_mut();
            let written: i64 = redis::Script::new(UPDATE_SCRIPT)
                .key(self.room_key(lease.room_id))
                .key(&new_key)
                .key(self.index_key())
                .key(old_key)
                .arg(&json)
                .arg(lease.room_id.to_string())
                .arg(previous.unwrap_or_default())
                .invoke_async(&mut conn)
                .await?;
            if written == 1 {
                return Ok(());
            }
            debug!(room_id = %lease.room_id, "Lease changed during update, retrying");
        }
        Err(AppError::service_unavailable(format!(
            "Lease for room {} kept changing during update",
            lease.room_id
        )))
    }

    async fn delete(&self, room_id: RoomId) -> AppResult<bool> {
        for _ in 0..SWAP_ATTEMPTS {
            let Some(raw) = self.get_raw(room_id).await? else {
                let mut conn = self.client.conn_mut();
                let _: i64 = redis::cmd("SREM")
                    .arg(self.index_key())
                    .arg(room_id.to_string())
                    .query_async(&mut conn)
                    .await?;
                return Ok(false);
            };
            let container_key = self.container_key(&stored_container(&raw)?);

            let mut conn = self.client.conn_mut();
            let deleted: i64 = redis::Script::new(DELETE_SCRIPT)
                .key(self.room_key(room_id))
                .key(self.index_key())
                .key(container_key)
                .arg(room_id.to_string())
                .arg(raw)
                .invoke_async(&mut conn)
                .await?;
            if deleted == 1 {
                return Ok(true);
            }
            debug!(room_id = %room_id, "Lease changed during delete, retrying");
        }
        Err(AppError::service_unavailable(format!(
            "Lease for room {room_id} kept changing during delete"
        )))
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<VirtualBrowserLease>> {
        let mut expired: Vec<VirtualBrowserLease> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|l| l.is_expired(now))
            .collect();
        expired.sort_by_key(|l| l.expires_at);
        Ok(expired)
    }

    async fn list_all(&self) -> AppResult<Vec<VirtualBrowserLease>> {
        let mut all = self.load_all().await?;
        all.sort_by_key(|l| l.allocated_at);
        Ok(all)
    }
}

/// Room metadata as plain string keys.
#[derive(Debug, Clone)]
pub struct RedisRoomStore {
    client: RedisClient,
}

impl RedisRoomStore {
    /// Creates a store over an existing connection.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn last_released_at(&self, room_id: RoomId) -> AppResult<Option<DateTime<Utc>>> {
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.client.prefixed_key(&keys::room_last_released(room_id)))
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!(room_id = %room_id, value = %raw, error = %e, "Ignoring malformed release timestamp");
                Ok(None)
            }
        }
    }

    async fn set_last_released_at(&self, room_id: RoomId, at: DateTime<Utc>) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = redis::cmd("SET")
            .arg(self.client.prefixed_key(&keys::room_last_released(room_id)))
            .arg(at.to_rfc3339())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn controller_connection(&self, room_id: RoomId) -> AppResult<Option<ConnectionId>> {
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.client.prefixed_key(&keys::room_controller(room_id)))
            .query_async(&mut conn)
            .await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    async fn set_controller_connection(
        &self,
        room_id: RoomId,
        connection_id: Option<ConnectionId>,
    ) -> AppResult<()> {
        let key = self.client.prefixed_key(&keys::room_controller(room_id));
        let mut conn = self.client.conn_mut();
        let _: () = match connection_id {
            Some(id) => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(id.to_string())
                    .query_async(&mut conn)
                    .await?
            }
            None => redis::cmd("DEL").arg(key).query_async(&mut conn).await?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browserhub_entity::container::ContainerInfo;

    #[test]
    fn test_scripts_never_build_keys() {
        for script in [CREATE_SCRIPT, UPDATE_SCRIPT, DELETE_SCRIPT] {
            assert!(!script.contains(".."), "script concatenates a key:\n{script}");
            assert!(!script.contains("cjson"), "script derives a key from a record:\n{script}");
        }
    }

    #[test]
    fn test_stored_container_reads_lease_record() {
        let lease = VirtualBrowserLease::grant(
            RoomId::new(),
            &ContainerInfo::new("neko-2", "http://neko-2:8080"),
            Utc::now(),
            chrono::Duration::minutes(180),
        );
        let raw = serde_json::to_string(&lease).unwrap();
        assert_eq!(stored_container(&raw).unwrap(), ContainerId::from("neko-2"));
        assert!(stored_container("not json").is_err());
    }
}
