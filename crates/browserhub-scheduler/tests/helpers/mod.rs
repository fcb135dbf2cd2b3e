//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use browserhub_core::config::SchedulerConfig;
use browserhub_core::error::AppError;
use browserhub_core::result::AppResult;
use browserhub_core::types::{ConnectionId, ContainerId, ManualClock, RoomId};
use browserhub_entity::container::{ContainerHandle, ContainerInfo};
use browserhub_entity::event::BrowserEvent;
use browserhub_scheduler::ContainerPool;
use browserhub_scheduler::pool::MemoryContainerPool;
use browserhub_scheduler::ports::Notifier;
use browserhub_scheduler::queue::MemoryQueueStore;
use browserhub_scheduler::runtime::StaticContainerRuntime;
use browserhub_scheduler::store::{MemoryLeaseStore, MemoryRoomStore};
use browserhub_scheduler::{SchedulerBackends, VirtualBrowserScheduler};

/// Where an event was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Room(RoomId),
    Connection(ConnectionId),
}

/// Notifier that records every event it is asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Target, BrowserEvent)>>,
    reachable: Mutex<HashSet<ConnectionId>>,
}

impl RecordingNotifier {
    /// Make a connection reachable for direct delivery.
    pub fn connect(&self, connection_id: ConnectionId) {
        self.reachable.lock().unwrap().insert(connection_id);
    }

    /// Names of events broadcast to a room, in order.
    pub fn room_events(&self, room_id: RoomId) -> Vec<&'static str> {
        self.events_for(Target::Room(room_id))
    }

    /// Names of events delivered to a connection, in order.
    pub fn connection_events(&self, connection_id: ConnectionId) -> Vec<&'static str> {
        self.events_for(Target::Connection(connection_id))
    }

    /// Every event sent so far.
    pub fn all(&self) -> Vec<(Target, BrowserEvent)> {
        self.sent.lock().unwrap().clone()
    }

    fn events_for(&self, target: Target) -> Vec<&'static str> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == target)
            .map(|(_, e)| e.name())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_to_room(&self, room_id: RoomId, event: &BrowserEvent) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((Target::Room(room_id), event.clone()));
        Ok(())
    }

    async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        event: &BrowserEvent,
    ) -> AppResult<bool> {
        if !self.reachable.lock().unwrap().contains(&connection_id) {
            return Ok(false);
        }
        self.sent
            .lock()
            .unwrap()
            .push((Target::Connection(connection_id), event.clone()));
        Ok(true)
    }
}

/// In-memory pool that can pause a claim midway or fail returns.
#[derive(Debug, Default)]
pub struct ScriptedPool {
    inner: MemoryContainerPool,
    hold_next_claim: AtomicBool,
    claim_started: Notify,
    claim_gate: Notify,
    failing_releases: AtomicU32,
}

impl ScriptedPool {
    /// Make the next `try_allocate` wait for [`ScriptedPool::open_gate`].
    pub fn hold_next_claim(&self) {
        self.hold_next_claim.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held claim is waiting at the gate.
    pub async fn claim_waiting(&self) {
        self.claim_started.notified().await;
    }

    /// Let the held claim proceed.
    pub fn open_gate(&self) {
        self.claim_gate.notify_one();
    }

    /// Make the next `count` returns fail.
    pub fn fail_releases(&self, count: u32) {
        self.failing_releases.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerPool for ScriptedPool {
    async fn try_allocate(&self) -> AppResult<Option<ContainerHandle>> {
        if self.hold_next_claim.swap(false, Ordering::SeqCst) {
            self.claim_started.notify_one();
            self.claim_gate.notified().await;
        }
        self.inner.try_allocate().await
    }

    async fn release(&self, container_id: &ContainerId) -> AppResult<bool> {
        let failing = self
            .failing_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::cache("connection reset"));
        }
        self.inner.release(container_id).await
    }

    async fn available_count(&self) -> AppResult<u32> {
        self.inner.available_count().await
    }

    async fn capacity(&self) -> AppResult<u32> {
        self.inner.capacity().await
    }

    async fn seed(&self, containers: &[ContainerId], held: &[ContainerId]) -> AppResult<()> {
        self.inner.seed(containers, held).await
    }
}

/// A scheduler on in-memory backends with a hand-driven clock.
pub struct TestHarness {
    pub scheduler: VirtualBrowserScheduler,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub runtime: StaticContainerRuntime,
    pub leases: MemoryLeaseStore,
    pub pool: Arc<ScriptedPool>,
}

impl TestHarness {
    /// A reconciled scheduler with `capacity` containers and default timings.
    pub async fn new(capacity: usize) -> Self {
        Self::with_config(capacity, SchedulerConfig::default()).await
    }

    /// A reconciled scheduler with `capacity` containers.
    pub async fn with_config(capacity: usize, config: SchedulerConfig) -> Self {
        let runtime = StaticContainerRuntime::new(
            (1..=capacity).map(|i| ContainerInfo::new(format!("neko-{i}"), format!("http://neko-{i}"))),
        );
        Self::build(runtime, MemoryLeaseStore::new(), config).await
    }

    /// A scheduler over an existing runtime and lease store, reconciled.
    pub async fn build(
        runtime: StaticContainerRuntime,
        leases: MemoryLeaseStore,
        config: SchedulerConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let notifier = Arc::new(RecordingNotifier::default());
        let pool = Arc::new(ScriptedPool::default());

        let scheduler = VirtualBrowserScheduler::new(
            SchedulerBackends {
                pool: pool.clone(),
                queue_store: Arc::new(MemoryQueueStore::new()),
                leases: Arc::new(leases.clone()),
                rooms: Arc::new(MemoryRoomStore::new()),
                notifier: notifier.clone(),
                runtime: Arc::new(runtime.clone()),
            },
            &config,
            clock.clone(),
        );
        scheduler
            .reconcile_on_startup()
            .await
            .expect("startup reconciliation");

        Self {
            scheduler,
            clock,
            notifier,
            runtime,
            leases,
            pool,
        }
    }

    /// Move the scheduler clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Run pending release follow-ups to completion.
    pub async fn settle(&self) {
        self.scheduler.settle().await;
    }
}

/// Container id shorthand.
pub fn container(name: &str) -> ContainerId {
    ContainerId::from(name)
}
