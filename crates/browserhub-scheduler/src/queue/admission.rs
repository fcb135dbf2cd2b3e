//! The admission queue used by the scheduler.

use std::sync::Arc;

use tracing::{debug, error, info};

use browserhub_core::result::AppResult;
use browserhub_core::types::{Clock, RoomId};
use browserhub_entity::container::ContainerHandle;
use browserhub_entity::queue::{QueueEntry, QueueStatusView};

use super::state::{Enqueued, QueueState};
use super::store::QueueStore;
use crate::pool::ContainerPool;

/// How a room entered the system through [`AdmissionQueue::admit`].
#[derive(Debug)]
pub enum Admission {
    /// The line was empty and a slot was claimed for the room.
    Claimed(ContainerHandle),
    /// The room is in line, newly or from an earlier request.
    Queued(Enqueued),
}

/// Fair FIFO queue of rooms waiting for a container.
///
/// Each operation takes the store lock, applies one [`QueueState`]
/// transition and commits only if the state changed.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    notification_timeout: chrono::Duration,
}

impl AdmissionQueue {
    /// Creates a queue over `store`. Offers lapse after `notification_timeout`.
    pub fn new(
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
        notification_timeout: std::time::Duration,
    ) -> Self {
        let notification_timeout = chrono::Duration::from_std(notification_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        Self {
            store,
            clock,
            notification_timeout,
        }
    }

    /// Add a room to the back of the line. Idempotent.
    pub async fn enqueue(&self, room_id: RoomId) -> AppResult<Enqueued> {
        let now = self.clock.now();
        let result = self.mutate(|state| state.enqueue(room_id, now)).await?;
        if result.created {
            info!(room_id = %room_id, position = result.position, "Room queued for a virtual browser");
        }
        Ok(result)
    }

    /// The waiting room that would be notified next.
    pub async fn peek_next(&self) -> AppResult<Option<RoomId>> {
        Ok(self.store.snapshot().await?.peek_next())
    }

    /// Claim a slot for the room if nobody is in line, otherwise queue it.
    ///
    /// The emptiness check and the claim happen under the queue lock, so
    /// no offer can be made between them and a newcomer never takes a
    /// slot reserved for a notified room.
    pub async fn admit(&self, room_id: RoomId, pool: &dyn ContainerPool) -> AppResult<Admission> {
        let now = self.clock.now();
        let mut guard = self.store.lock().await?;

        if let Some(entry) = guard.state().entry(room_id) {
            let position = if entry.is_waiting() { entry.position } else { 0 };
            guard.release().await?;
            return Ok(Admission::Queued(Enqueued {
                position,
                created: false,
            }));
        }

        if guard.state().is_empty() {
            match pool.try_allocate().await {
                Ok(Some(handle)) => {
                    guard.release().await?;
                    return Ok(Admission::Claimed(handle));
                }
                Ok(None) => debug!(room_id = %room_id, "Pool exhausted with an empty queue"),
                Err(e) => {
                    guard.release().await?;
                    return Err(e);
                }
            }
        }

        let enqueued = guard.state().enqueue(room_id, now);
        if let Err(violation) = guard.state().validate() {
            error!(violation = %violation, "Admission queue invariant violated");
            debug_assert!(false, "admission queue invariant violated: {violation}");
        }
        guard.commit().await?;
        info!(room_id = %room_id, position = enqueued.position, "Room queued for a virtual browser");
        Ok(Admission::Queued(enqueued))
    }

    /// Offer a container to a specific waiting room.
    pub async fn notify(&self, room_id: RoomId) -> AppResult<bool> {
        let now = self.clock.now();
        let timeout = self.notification_timeout;
        self.mutate(|state| state.notify(room_id, now, timeout))
            .await
    }

    /// Offer a container to the next waiting room if the number of
    /// outstanding offers is below `free_slots`.
    pub async fn notify_next(&self, free_slots: u32) -> AppResult<Option<QueueStatusView>> {
        let now = self.clock.now();
        let timeout = self.notification_timeout;
        self.mutate(|state| {
            state
                .notify_next(free_slots, now, timeout)
                .and_then(|room_id| state.status(room_id, now))
        })
        .await
    }

    /// Resolve an offer by accepting it.
    pub async fn accept(&self, room_id: RoomId) -> AppResult<bool> {
        self.mutate(|state| state.accept(room_id)).await
    }

    /// Resolve an offer by declining it. The room leaves the line.
    pub async fn decline(&self, room_id: RoomId) -> AppResult<bool> {
        self.mutate(|state| state.decline(room_id)).await
    }

    /// Remove a room in any state.
    pub async fn remove(&self, room_id: RoomId) -> AppResult<bool> {
        self.mutate(|state| state.remove(room_id)).await
    }

    /// Put every lapsed offer back in line. Returns the affected rooms.
    pub async fn process_expired_notifications(&self) -> AppResult<Vec<RoomId>> {
        let now = self.clock.now();
        let expired = self
            .mutate(|state| state.expire_notifications(now))
            .await?;
        for room_id in &expired {
            info!(room_id = %room_id, "Queue notification expired; room returned to waiting");
        }
        Ok(expired)
    }

    /// The room's entry, if any.
    pub async fn entry(&self, room_id: RoomId) -> AppResult<Option<QueueEntry>> {
        Ok(self.store.snapshot().await?.entry(room_id).cloned())
    }

    /// Public status of one room.
    pub async fn status(&self, room_id: RoomId) -> AppResult<Option<QueueStatusView>> {
        let now = self.clock.now();
        Ok(self.store.snapshot().await?.status(room_id, now))
    }

    /// Status of every queued room, notified rooms first.
    pub async fn all_statuses(&self) -> AppResult<Vec<QueueStatusView>> {
        let now = self.clock.now();
        Ok(self.store.snapshot().await?.all_statuses(now))
    }

    /// Number of waiting and notified rooms.
    pub async fn len(&self) -> AppResult<u32> {
        Ok(self.store.snapshot().await?.len())
    }

    /// Run `f` against the state under the queue lock. Commits when the
    /// state changed, otherwise releases the lock untouched.
    async fn mutate<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut QueueState) -> T,
    {
        let mut guard = self.store.lock().await?;
        let before = guard.state().clone();
        let out = f(guard.state());

        if *guard.state() == before {
            guard.release().await?;
            return Ok(out);
        }

        if let Err(violation) = guard.state().validate() {
            error!(violation = %violation, "Admission queue invariant violated");
            debug_assert!(false, "admission queue invariant violated: {violation}");
        }
        let queue_length = guard.state().len();
        guard.commit().await?;
        debug!(queue_length = queue_length, "Admission queue updated");
        Ok(out)
    }
}
