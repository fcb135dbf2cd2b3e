//! Cache key builders for every Redis-backed structure.
//!
//! Keys are returned unprefixed; [`crate::RedisClient::prefixed_key`]
//! applies the deployment prefix.

use browserhub_core::types::{ContainerId, RoomId};

// ── Container pool ─────────────────────────────────────────

/// Set of every container id the pool manages.
pub fn pool_all() -> String {
    "pool:all".to_string()
}

/// Set of container ids currently free.
pub fn pool_free() -> String {
    "pool:free".to_string()
}

// ── Admission queue ────────────────────────────────────────

/// JSON snapshot of queue entries and notifications.
pub fn queue_state() -> String {
    "queue:state".to_string()
}

/// Mutual-exclusion lock guarding queue mutations.
pub fn queue_lock() -> String {
    "queue:lock".to_string()
}

// ── Leases ─────────────────────────────────────────────────

/// Lease record of a room.
pub fn lease_by_room(room_id: RoomId) -> String {
    format!("{}{room_id}", lease_by_room_prefix())
}

/// Common prefix of [`lease_by_room`] keys.
pub fn lease_by_room_prefix() -> String {
    "lease:room:".to_string()
}

/// Room currently leasing a container.
pub fn lease_by_container(container_id: &ContainerId) -> String {
    format!("{}{container_id}", lease_by_container_prefix())
}

/// Common prefix of [`lease_by_container`] keys, for Lua scripts that
/// derive the key from a stored lease.
pub fn lease_by_container_prefix() -> String {
    "lease:container:".to_string()
}

/// Set of room ids holding a lease record.
pub fn lease_index() -> String {
    "lease:index".to_string()
}

// ── Rooms ──────────────────────────────────────────────────

/// Last release timestamp of a room (cooldown anchor).
pub fn room_last_released(room_id: RoomId) -> String {
    format!("room:released:{room_id}")
}

/// Connection currently controlling a room.
pub fn room_controller(room_id: RoomId) -> String {
    format!("room:controller:{room_id}")
}

// ── Realtime ───────────────────────────────────────────────

/// Set of connection ids currently attached to any node.
pub fn realtime_connections() -> String {
    "realtime:connections".to_string()
}
