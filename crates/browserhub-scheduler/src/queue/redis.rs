//! Redis queue store for multi-node deployments.
//!
//! The queue is one JSON snapshot guarded by a token lock
//! (`SET NX PX`). Commit and release are Lua scripts that only act while
//! the caller still owns the lock, so a holder whose lock expired can
//! never overwrite a newer snapshot.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use browserhub_cache::RedisClient;
use browserhub_cache::keys;
use browserhub_core::config::RedisCacheConfig;
use browserhub_core::error::AppError;
use browserhub_core::result::AppResult;

use super::state::QueueState;
use super::store::{QueueGuard, QueueStore};

/// Lua script that writes the snapshot if the lock is still ours.
///
/// KEYS[1] = lock key
/// KEYS[2] = state key
/// ARGV[1] = lock token
/// ARGV[2] = JSON snapshot
///
/// Returns 1 on success, 0 if the lock was lost.
const COMMIT_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) ~= ARGV[1] then
        return 0
    end
    redis.call('SET', KEYS[2], ARGV[2])
    redis.call('DEL', KEYS[1])
    return 1
"#;

/// Lua script that deletes the lock if it is still ours.
///
/// KEYS[1] = lock key
/// ARGV[1] = lock token
const RELEASE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Queue snapshot stored in Redis.
#[derive(Debug, Clone)]
pub struct RedisQueueStore {
    client: RedisClient,
    lock_ttl_ms: u64,
    retry_delay: Duration,
    attempts: u32,
}

impl RedisQueueStore {
    /// Creates a store using the lock timings from configuration.
    pub fn new(client: RedisClient, config: &RedisCacheConfig) -> Self {
        Self {
            client,
            lock_ttl_ms: config.queue_lock_ttl_ms,
            retry_delay: Duration::from_millis(config.queue_lock_retry_ms),
            attempts: config.queue_lock_attempts.max(1),
        }
    }

    fn lock_key(&self) -> String {
        self.client.prefixed_key(&keys::queue_lock())
    }

    fn state_key(&self) -> String {
        self.client.prefixed_key(&keys::queue_state())
    }

    async fn load(&self) -> AppResult<QueueState> {
        let mut conn = self.client.conn_mut();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.state_key())
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(QueueState::default()),
        }
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn lock(&self) -> AppResult<Box<dyn QueueGuard>> {
        let token = Uuid::new_v4().to_string();
        let lock_key = self.lock_key();
        let mut conn = self.client.conn_mut();

        for attempt in 1..=self.attempts {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(self.lock_ttl_ms)
                .query_async(&mut conn)
                .await?;

            if acquired.is_some() {
                debug!(attempt = attempt, "Queue lock acquired");
                let working = match self.load().await {
                    Ok(state) => state,
                    Err(e) => {
                        let _ = release_lock(&self.client, &lock_key, &token).await;
                        return Err(e);
                    }
                };
                return Ok(Box::new(RedisQueueGuard {
                    client: self.client.clone(),
                    lock_key,
                    state_key: self.state_key(),
                    token,
                    working,
                    finished: false,
                }));
            }

            tokio::time::sleep(self.retry_delay).await;
        }

        warn!(attempts = self.attempts, "Gave up waiting for queue lock");
        Err(AppError::service_unavailable("Admission queue is busy"))
    }

    async fn snapshot(&self) -> AppResult<QueueState> {
        self.load().await
    }
}

async fn release_lock(client: &RedisClient, lock_key: &str, token: &str) -> AppResult<bool> {
    let mut conn = client.conn_mut();
    let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
        .key(lock_key)
        .arg(token)
        .invoke_async(&mut conn)
        .await?;
    Ok(deleted == 1)
}

struct RedisQueueGuard {
    client: RedisClient,
    lock_key: String,
    state_key: String,
    token: String,
    working: QueueState,
    finished: bool,
}

#[async_trait]
impl QueueGuard for RedisQueueGuard {
    fn state(&mut self) -> &mut QueueState {
        &mut self.working
    }

    async fn commit(&mut self) -> AppResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let json = serde_json::to_string(&self.working)?;
        let mut conn = self.client.conn_mut();
        let written: i64 = redis::Script::new(COMMIT_SCRIPT)
            .key(&self.lock_key)
            .key(&self.state_key)
            .arg(&self.token)
            .arg(json)
            .invoke_async(&mut conn)
            .await?;

        if written == 1 {
            Ok(())
        } else {
            warn!("Queue lock expired before commit; changes discarded");
            Err(AppError::conflict("Admission queue lock was lost"))
        }
    }

    async fn release(&mut self) -> AppResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if !release_lock(&self.client, &self.lock_key, &self.token).await? {
            debug!("Queue lock already expired at release");
        }
        Ok(())
    }
}
