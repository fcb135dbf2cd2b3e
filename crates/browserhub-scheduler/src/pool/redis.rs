//! Redis-based container pool using atomic set operations.
//!
//! Suitable for multi-node deployments.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use browserhub_cache::RedisClient;
use browserhub_cache::keys;
use browserhub_core::error::AppError;
use browserhub_core::result::AppResult;
use browserhub_core::types::ContainerId;
use browserhub_entity::container::ContainerHandle;

use super::ContainerPool;

/// Lua script for idempotent slot return.
///
/// KEYS[1] = set of all containers
/// KEYS[2] = set of free containers
/// ARGV[1] = container id
///
/// Returns:
///   1 = slot freed
///   0 = slot was already free
///  -1 = unknown container
const RELEASE_SCRIPT: &str = r#"
    local all_key = KEYS[1]
    local free_key = KEYS[2]
    local container_id = ARGV[1]

    if redis.call('SISMEMBER', all_key, container_id) == 0 then
        return -1
    end

    return redis.call('SADD', free_key, container_id)
"#;

/// Lua script that replaces the pool contents in one step.
///
/// KEYS[1] = set of all containers
/// KEYS[2] = set of free containers
/// ARGV[1] = number of containers N
/// ARGV[2..N+1] = container ids
/// ARGV[N+2..] = held container ids
const SEED_SCRIPT: &str = r#"
    local all_key = KEYS[1]
    local free_key = KEYS[2]
    local count = tonumber(ARGV[1])

    redis.call('DEL', all_key, free_key)

    local held = {}
    for i = count + 2, #ARGV do
        held[ARGV[i]] = true
    end

    for i = 2, count + 1 do
        redis.call('SADD', all_key, ARGV[i])
        if not held[ARGV[i]] then
            redis.call('SADD', free_key, ARGV[i])
        end
    end

    return redis.call('SCARD', free_key)
"#;

/// Redis-based container pool for multi-node deployments.
#[derive(Debug, Clone)]
pub struct RedisContainerPool {
    /// Redis client.
    client: RedisClient,
}

impl RedisContainerPool {
    /// Creates a pool over an existing connection. Call [`ContainerPool::seed`]
    /// before first use.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn all_key(&self) -> String {
        self.client.prefixed_key(&keys::pool_all())
    }

    fn free_key(&self) -> String {
        self.client.prefixed_key(&keys::pool_free())
    }
}

#[async_trait]
impl ContainerPool for RedisContainerPool {
    async fn try_allocate(&self) -> AppResult<Option<ContainerHandle>> {
        let mut conn = self.client.conn_mut();

        // SPOP removes and returns in one command, so no two callers can
        // observe the same member.
        let claimed: Option<String> = redis::cmd("SPOP")
            .arg(self.free_key())
            .query_async(&mut conn)
            .await?;

        match claimed {
            Some(id) => {
                info!(container_id = %id, "Container slot claimed via Redis");
                Ok(Some(ContainerHandle::new(ContainerId::new(id))))
            }
            None => {
                debug!("No free container slot in Redis pool");
                Ok(None)
            }
        }
    }

    async fn release(&self, container_id: &ContainerId) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();

        let result: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.all_key())
            .key(self.free_key())
            .arg(container_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => {
                info!(container_id = %container_id, "Container slot returned via Redis");
                Ok(true)
            }
            0 => {
                debug!(container_id = %container_id, "Container slot already free");
                Ok(false)
            }
            -1 => {
                warn!(container_id = %container_id, "Attempted to return unknown container");
                Ok(false)
            }
            other => Err(AppError::cache(format!(
                "Unexpected pool release result: {other}"
            ))),
        }
    }

    async fn available_count(&self) -> AppResult<u32> {
        let mut conn = self.client.conn_mut();
        let count: u32 = redis::cmd("SCARD")
            .arg(self.free_key())
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn capacity(&self) -> AppResult<u32> {
        let mut conn = self.client.conn_mut();
        let count: u32 = redis::cmd("SCARD")
            .arg(self.all_key())
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn seed(&self, containers: &[ContainerId], held: &[ContainerId]) -> AppResult<()> {
        let mut conn = self.client.conn_mut();

        let script = redis::Script::new(SEED_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(self.all_key())
            .key(self.free_key())
            .arg(containers.len());
        for id in containers {
            invocation.arg(id.as_str());
        }
        for id in held {
            invocation.arg(id.as_str());
        }

        let available: u32 = invocation.invoke_async(&mut conn).await?;

        info!(
            capacity = containers.len(),
            available = available,
            "Redis container pool seeded"
        );
        Ok(())
    }
}
