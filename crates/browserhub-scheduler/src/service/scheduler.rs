//! Virtual browser scheduler: admission, leasing and reclamation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashSet;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use browserhub_core::config::SchedulerConfig;
use browserhub_core::error::AppError;
use browserhub_core::result::AppResult;
use browserhub_core::types::{Clock, ConnectionId, ContainerId, RoomId};
use browserhub_entity::container::{ContainerHandle, PoolStatus};
use browserhub_entity::event::BrowserEvent;
use browserhub_entity::lease::VirtualBrowserLease;
use browserhub_entity::queue::QueueStatusView;
use browserhub_entity::room::CooldownStatus;

use super::outcome::{
    AcceptOutcome, CancelOutcome, DeclineOutcome, LeaseAttempt, ReleaseOutcome, RequestOutcome,
    RestartOutcome,
};
use crate::pool::ContainerPool;
use crate::ports::{ContainerRuntime, LeaseStore, Notifier, RoomStore};
use crate::queue::{Admission, AdmissionQueue, Enqueued, QueueStore};

/// Storage and collaborator implementations the scheduler runs on.
#[derive(Debug, Clone)]
pub struct SchedulerBackends {
    /// Container slot pool.
    pub pool: Arc<dyn ContainerPool>,
    /// Admission queue storage.
    pub queue_store: Arc<dyn QueueStore>,
    /// Lease records.
    pub leases: Arc<dyn LeaseStore>,
    /// Room metadata.
    pub rooms: Arc<dyn RoomStore>,
    /// Realtime event delivery.
    pub notifier: Arc<dyn Notifier>,
    /// Container lifecycle.
    pub runtime: Arc<dyn ContainerRuntime>,
}

/// Durations the scheduler works with, converted once.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timings {
    pub(crate) session_duration: chrono::Duration,
    pub(crate) cooldown: chrono::Duration,
    pub(crate) release_grace: std::time::Duration,
}

impl Timings {
    fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            session_duration: to_chrono(config.session_duration()),
            cooldown: to_chrono(config.cooldown()),
            release_grace: config.release_grace(),
        }
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Orchestrates rooms, the admission queue and the container pool.
///
/// Cheap to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct VirtualBrowserScheduler {
    pub(crate) pool: Arc<dyn ContainerPool>,
    pub(crate) queue: AdmissionQueue,
    pub(crate) leases: Arc<dyn LeaseStore>,
    pub(crate) rooms: Arc<dyn RoomStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) timings: Timings,
    /// Held while a queue processing pass runs.
    processing: Arc<Mutex<()>>,
    /// Set by every processing request; cleared by the pass that serves it.
    rerun: Arc<AtomicBool>,
    /// Deferred container returns.
    pub(crate) follow_ups: TaskTracker,
    /// Containers whose lease is gone but whose slot could not be freed.
    pub(crate) pending_returns: Arc<DashSet<ContainerId>>,
}

impl VirtualBrowserScheduler {
    /// Creates a scheduler over the given backends.
    pub fn new(
        backends: SchedulerBackends,
        config: &SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = AdmissionQueue::new(
            backends.queue_store,
            clock.clone(),
            config.notification_timeout(),
        );
        Self {
            pool: backends.pool,
            queue,
            leases: backends.leases,
            rooms: backends.rooms,
            notifier: backends.notifier,
            runtime: backends.runtime,
            clock,
            timings: Timings::from_config(config),
            processing: Arc::new(Mutex::new(())),
            rerun: Arc::new(AtomicBool::new(false)),
            follow_ups: TaskTracker::new(),
            pending_returns: Arc::new(DashSet::new()),
        }
    }

    /// The admission queue.
    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    // ── Room operations ───────────────────────────────────────

    /// Ask for a virtual browser on behalf of a room.
    pub async fn request_virtual_browser(&self, room_id: RoomId) -> AppResult<RequestOutcome> {
        if let Some(rejected) = self.reject_in_cooldown(room_id).await? {
            return Ok(rejected);
        }

        if let Some(lease) = self.leases.get(room_id).await? {
            if lease.is_active(self.clock.now()) {
                return Ok(RequestOutcome::AlreadyAllocated { lease });
            }
            // Lapsed but not swept yet. Reclaiming it starts the cooldown.
            debug!(room_id = %room_id, "Reclaiming a lapsed lease on request");
            self.process_expired_sessions().await?;
            if let Some(rejected) = self.reject_in_cooldown(room_id).await? {
                return Ok(rejected);
            }
        }

        if let Some(queue_status) = self.queue.status(room_id).await? {
            return Ok(RequestOutcome::AlreadyQueued { queue_status });
        }

        // Claims only when nobody is in line; a free slot belongs to them.
        let handle = match self.queue.admit(room_id, &*self.pool).await? {
            Admission::Claimed(handle) => handle,
            Admission::Queued(enqueued) => return self.after_enqueue(room_id, enqueued).await,
        };

        match self.lease_from_handle(room_id, handle).await? {
            LeaseAttempt::Granted(lease) => {
                self.emit(
                    room_id,
                    &BrowserEvent::Allocated {
                        lease: lease.clone(),
                    },
                )
                .await;
                Ok(RequestOutcome::Allocated { lease })
            }
            LeaseAttempt::Existing(lease) => Ok(RequestOutcome::AlreadyAllocated { lease }),
        }
    }

    /// Take the container a notified room was offered.
    pub async fn accept_queue_notification(&self, room_id: RoomId) -> AppResult<AcceptOutcome> {
        if let Some(lease) = self.leases.get(room_id).await? {
            self.queue.remove(room_id).await?;
            return Ok(AcceptOutcome::AlreadyAllocated { lease });
        }

        let notified = self
            .queue
            .entry(room_id)
            .await?
            .is_some_and(|e| e.is_notified());
        if !notified {
            return Ok(AcceptOutcome::NotNotified);
        }

        // Claim before resolving the offer, so the slot never looks free
        // to the next processing pass.
        let Some(handle) = self.pool.try_allocate().await? else {
            if !self.queue.accept(room_id).await? {
                return Ok(AcceptOutcome::NotNotified);
            }
            error!(
                room_id = %room_id,
                "Accepted queue notification but no container slot was free"
            );
            return Err(AppError::inconsistency(format!(
                "room {room_id} accepted an offer but the pool had no free slot"
            )));
        };

        if !self.queue.accept(room_id).await? {
            self.return_slot(&handle).await;
            return Ok(AcceptOutcome::NotNotified);
        }

        match self.lease_from_handle(room_id, handle).await? {
            LeaseAttempt::Granted(lease) => {
                info!(
                    room_id = %room_id,
                    container_id = %lease.container_id,
                    "Queue notification accepted"
                );
                self.emit(
                    room_id,
                    &BrowserEvent::Allocated {
                        lease: lease.clone(),
                    },
                )
                .await;
                Ok(AcceptOutcome::Allocated { lease })
            }
            LeaseAttempt::Existing(lease) => Ok(AcceptOutcome::AlreadyAllocated { lease }),
        }
    }

    /// Turn down an offer. The room leaves the queue entirely.
    pub async fn decline_queue_notification(&self, room_id: RoomId) -> AppResult<DeclineOutcome> {
        if !self.queue.decline(room_id).await? {
            return Ok(DeclineOutcome::NotNotified);
        }
        info!(room_id = %room_id, "Queue notification declined");
        self.emit(room_id, &BrowserEvent::QueueCancelled).await;
        self.process_queue_logged().await;
        Ok(DeclineOutcome::Declined)
    }

    /// Leave the queue, whatever the room's state in it.
    pub async fn cancel_queue(&self, room_id: RoomId) -> AppResult<CancelOutcome> {
        if !self.queue.remove(room_id).await? {
            return Ok(CancelOutcome::NotQueued);
        }
        info!(room_id = %room_id, "Room left the queue");
        self.emit(room_id, &BrowserEvent::QueueCancelled).await;

        if self.pool.available_count().await? > 0 {
            self.process_queue_logged().await;
        }
        Ok(CancelOutcome::Cancelled)
    }

    /// Give up a lease. Starts the room's cooldown; the container goes
    /// back to the pool after the grace delay.
    pub async fn release_virtual_browser(&self, room_id: RoomId) -> AppResult<ReleaseOutcome> {
        let Some(lease) = self.leases.get(room_id).await? else {
            return Ok(ReleaseOutcome::NotAllocated);
        };
        if !self.leases.delete(room_id).await? {
            debug!(room_id = %room_id, "Lease already removed concurrently");
            return Ok(ReleaseOutcome::NotAllocated);
        }

        // The slot goes back even if the cooldown cannot be stamped.
        self.schedule_return(room_id, lease.container_id.clone());
        self.rooms
            .set_last_released_at(room_id, self.clock.now())
            .await?;
        info!(
            room_id = %room_id,
            container_id = %lease.container_id,
            "Virtual browser released"
        );
        self.emit(room_id, &BrowserEvent::Released).await;

        Ok(ReleaseOutcome::Released {
            container_id: lease.container_id,
        })
    }

    /// Restart the browser process of the room's container.
    pub async fn restart_browser(&self, room_id: RoomId) -> AppResult<RestartOutcome> {
        let now = self.clock.now();
        let Some(lease) = self.leases.get(room_id).await? else {
            return Ok(RestartOutcome::NotAllocated);
        };
        if !lease.is_active(now) {
            return Ok(RestartOutcome::NotAllocated);
        }

        if self.runtime.restart_process(&lease.container_id).await? {
            info!(room_id = %room_id, container_id = %lease.container_id, "Browser process restarted");
            Ok(RestartOutcome::Restarted)
        } else {
            warn!(room_id = %room_id, container_id = %lease.container_id, "Browser process restart failed");
            Ok(RestartOutcome::Failed)
        }
    }

    /// Designate the connection that receives the room's offers.
    pub async fn set_controller(
        &self,
        room_id: RoomId,
        connection_id: Option<ConnectionId>,
    ) -> AppResult<()> {
        self.rooms
            .set_controller_connection(room_id, connection_id)
            .await
    }

    // ── Queue processing ──────────────────────────────────────

    /// Offer free slots to waiting rooms, earliest first.
    ///
    /// Single-flight per process: a call that finds a pass already running
    /// returns immediately, and the running pass goes around once more.
    /// Returns the number of rooms notified by this call.
    pub async fn process_queue(&self) -> AppResult<u32> {
        self.rerun.store(true, Ordering::SeqCst);
        let mut notified = 0;

        loop {
            {
                let Ok(_running) = self.processing.try_lock() else {
                    debug!("Queue processing already running; rerun requested");
                    return Ok(notified);
                };
                while self.rerun.swap(false, Ordering::SeqCst) {
                    notified += self.process_queue_pass().await?;
                }
            }
            // A request that arrived between the last pass and unlocking
            // would otherwise be lost.
            if !self.rerun.load(Ordering::SeqCst) {
                return Ok(notified);
            }
        }
    }

    async fn process_queue_pass(&self) -> AppResult<u32> {
        let mut notified = 0;
        loop {
            let free = self.pool.available_count().await?;
            if free == 0 {
                break;
            }
            let Some(status) = self.queue.notify_next(free).await? else {
                break;
            };

            info!(
                room_id = %status.room_id,
                position = status.position,
                free_slots = free,
                "Room notified that a virtual browser is available"
            );
            self.deliver_available(status).await;
            notified += 1;
        }
        Ok(notified)
    }

    pub(crate) async fn process_queue_logged(&self) {
        if let Err(e) = self.process_queue().await {
            error!(error = %e, "Queue processing failed");
        }
    }

    // ── Maintenance ───────────────────────────────────────────

    /// Reclaim every lease past its expiry, and retry container returns
    /// that failed earlier. Returns the number of leases reclaimed.
    pub async fn process_expired_sessions(&self) -> AppResult<u32> {
        let now = self.clock.now();
        let mut freed = self.retry_pending_returns().await;
        let expired = self.leases.list_expired(now).await?;
        let mut reclaimed = 0;

        for lease in expired {
            let room_id = lease.room_id;
            if !self.leases.delete(room_id).await? {
                continue;
            }
            reclaimed += 1;

            if self.return_container(&lease.container_id).await {
                freed += 1;
            }
            if let Err(e) = self.rooms.set_last_released_at(room_id, now).await {
                warn!(room_id = %room_id, error = %e, "Could not start cooldown after lease expiry");
            }

            info!(
                room_id = %room_id,
                container_id = %lease.container_id,
                "Virtual browser lease expired"
            );
            self.emit(room_id, &BrowserEvent::Expired).await;
        }

        if freed > 0 {
            self.process_queue().await?;
        }
        Ok(reclaimed)
    }

    /// Put rooms whose offer lapsed back in line and pass the offer on.
    /// Returns the number of lapsed offers.
    pub async fn process_queue_notifications(&self) -> AppResult<u32> {
        let expired = self.queue.process_expired_notifications().await?;
        if !expired.is_empty() && self.pool.available_count().await? > 0 {
            self.process_queue().await?;
        }
        Ok(expired.len() as u32)
    }

    // ── Queries ───────────────────────────────────────────────

    /// The room's place in the queue, if any.
    pub async fn queue_status(&self, room_id: RoomId) -> AppResult<Option<QueueStatusView>> {
        self.queue.status(room_id).await
    }

    /// Every queued room, notified rooms first.
    pub async fn all_queue_statuses(&self) -> AppResult<Vec<QueueStatusView>> {
        self.queue.all_statuses().await
    }

    /// Whether the room may request a browser yet.
    pub async fn cooldown_status(&self, room_id: RoomId) -> AppResult<CooldownStatus> {
        let last_released = self.rooms.last_released_at(room_id).await?;
        Ok(CooldownStatus::evaluate(
            last_released,
            self.timings.cooldown,
            self.clock.now(),
        ))
    }

    /// The room's lease, if it holds one.
    pub async fn lease_status(&self, room_id: RoomId) -> AppResult<Option<VirtualBrowserLease>> {
        self.leases.get(room_id).await
    }

    /// Capacity and free slots of the pool.
    pub async fn pool_status(&self) -> AppResult<PoolStatus> {
        self.pool.status().await
    }

    // ── Internals ─────────────────────────────────────────────

    async fn reject_in_cooldown(&self, room_id: RoomId) -> AppResult<Option<RequestOutcome>> {
        let cooldown = self.cooldown_status(room_id).await?;
        if !cooldown.active {
            return Ok(None);
        }
        debug!(
            room_id = %room_id,
            remaining_seconds = cooldown.remaining_seconds,
            "Request rejected: cooldown active"
        );
        Ok(Some(RequestOutcome::CooldownActive {
            remaining_seconds: cooldown.remaining_seconds,
        }))
    }

    async fn after_enqueue(&self, room_id: RoomId, enqueued: Enqueued) -> AppResult<RequestOutcome> {
        // A concurrent request for the same room may have won a lease.
        if let Some(lease) = self.leases.get(room_id).await? {
            self.queue.remove(room_id).await?;
            return Ok(RequestOutcome::AlreadyAllocated { lease });
        }

        if !enqueued.created {
            if let Some(queue_status) = self.queue.status(room_id).await? {
                return Ok(RequestOutcome::AlreadyQueued { queue_status });
            }
        }

        let queue_length = self.queue.len().await?;
        self.emit(
            room_id,
            &BrowserEvent::Queued {
                position: enqueued.position,
                queue_length,
            },
        )
        .await;

        if self.pool.available_count().await? > 0 {
            self.process_queue_logged().await;
        }

        Ok(RequestOutcome::Queued {
            position: enqueued.position,
            queue_length,
        })
    }

    /// Bind a claimed slot to a room. The slot is returned on every path
    /// that does not end in a stored lease.
    async fn lease_from_handle(
        &self,
        room_id: RoomId,
        handle: ContainerHandle,
    ) -> AppResult<LeaseAttempt> {
        let container = match self.runtime.allocate(&handle.container_id).await {
            Ok(Some(container)) => container,
            Ok(None) => {
                self.return_slot(&handle).await;
                error!(container_id = %handle.container_id, "Claimed container is not running");
                return Err(AppError::external_service(format!(
                    "container {} is not running",
                    handle.container_id
                )));
            }
            Err(e) => {
                self.return_slot(&handle).await;
                return Err(e);
            }
        };

        let lease = VirtualBrowserLease::grant(
            room_id,
            &container,
            self.clock.now(),
            self.timings.session_duration,
        );

        match self.leases.create(&lease).await {
            Ok(true) => {
                info!(
                    room_id = %room_id,
                    container_id = %lease.container_id,
                    expires_at = %lease.expires_at,
                    "Virtual browser allocated"
                );
                Ok(LeaseAttempt::Granted(lease))
            }
            Ok(false) => {
                self.return_slot(&handle).await;
                match self.leases.get(room_id).await? {
                    Some(existing) => Ok(LeaseAttempt::Existing(existing)),
                    None => {
                        error!(
                            container_id = %handle.container_id,
                            "Pool handed out a container that already has a lease"
                        );
                        Err(AppError::inconsistency(format!(
                            "container {} is free in the pool but leased",
                            handle.container_id
                        )))
                    }
                }
            }
            Err(e) => {
                self.return_slot(&handle).await;
                Err(e)
            }
        }
    }

    async fn return_slot(&self, handle: &ContainerHandle) {
        if let Err(e) = self.pool.release(&handle.container_id).await {
            error!(
                container_id = %handle.container_id,
                error = %e,
                "Failed to return container slot"
            );
        }
    }

    /// Send the offer to the room's controller, or the whole room if the
    /// controller is unknown or unreachable.
    async fn deliver_available(&self, queue_status: QueueStatusView) {
        let room_id = queue_status.room_id;
        let event = BrowserEvent::Available { queue_status };

        let controller = match self.rooms.controller_connection(room_id).await {
            Ok(controller) => controller,
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "Could not resolve room controller");
                None
            }
        };

        if let Some(connection_id) = controller {
            match self.notifier.send_to_connection(connection_id, &event).await {
                Ok(true) => return,
                Ok(false) => debug!(
                    room_id = %room_id,
                    connection_id = %connection_id,
                    "Controller unreachable; broadcasting to room"
                ),
                Err(e) => warn!(
                    room_id = %room_id,
                    error = %e,
                    "Delivery to controller failed; broadcasting to room"
                ),
            }
        }
        self.emit(room_id, &event).await;
    }

    pub(crate) async fn emit(&self, room_id: RoomId, event: &BrowserEvent) {
        if let Err(e) = self.notifier.send_to_room(room_id, event).await {
            warn!(room_id = %room_id, event = event.name(), error = %e, "Failed to deliver event");
        }
    }
}
