//! End-to-end scheduling scenarios on in-memory backends.

mod helpers;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use browserhub_core::config::SchedulerConfig;
use browserhub_core::error::ErrorKind;
use browserhub_core::types::{ConnectionId, RoomId};
use browserhub_entity::container::ContainerInfo;
use browserhub_entity::lease::VirtualBrowserLease;
use browserhub_entity::queue::QueueEntryStatus;
use browserhub_scheduler::ContainerPool;
use browserhub_scheduler::ports::LeaseStore;
use browserhub_scheduler::runtime::StaticContainerRuntime;
use browserhub_scheduler::service::{
    AcceptOutcome, CancelOutcome, DeclineOutcome, ReleaseOutcome, RequestOutcome, RestartOutcome,
};
use browserhub_scheduler::store::MemoryLeaseStore;

use helpers::{TestHarness, container};

async fn allocate(h: &TestHarness, room: RoomId) -> VirtualBrowserLease {
    match h.scheduler.request_virtual_browser(room).await.unwrap() {
        RequestOutcome::Allocated { lease } => lease,
        other => panic!("expected allocation for {room}, got {other:?}"),
    }
}

async fn queue(h: &TestHarness, room: RoomId) -> u32 {
    match h.scheduler.request_virtual_browser(room).await.unwrap() {
        RequestOutcome::Queued { position, .. } => position,
        other => panic!("expected {room} to be queued, got {other:?}"),
    }
}

async fn assert_conserved(h: &TestHarness) {
    let status = h.scheduler.pool_status().await.unwrap();
    let leased = h.leases.list_all().await.unwrap().len() as u32;
    assert_eq!(status.available + leased, status.capacity);
}

#[tokio::test(start_paused = true)]
async fn test_single_container_end_to_end() {
    let h = TestHarness::new(1).await;
    let (a, b) = (RoomId::new(), RoomId::new());

    let lease_a = allocate(&h, a).await;
    assert_eq!(lease_a.container_id, container("neko-1"));
    assert_eq!(h.notifier.room_events(a), vec!["allocated"]);

    assert_eq!(queue(&h, b).await, 1);
    assert_eq!(h.notifier.room_events(b), vec!["queued"]);

    let released = h.scheduler.release_virtual_browser(a).await.unwrap();
    assert_eq!(
        released,
        ReleaseOutcome::Released {
            container_id: container("neko-1")
        }
    );
    // The container is held back for the grace delay.
    assert!(h.scheduler.queue_status(b).await.unwrap().unwrap().status == QueueEntryStatus::Waiting);

    h.settle().await;
    let status_b = h.scheduler.queue_status(b).await.unwrap().unwrap();
    assert_eq!(status_b.status, QueueEntryStatus::Notified);
    assert_eq!(status_b.position, 1);
    assert_eq!(h.notifier.room_events(b), vec!["queued", "available"]);

    let accepted = h.scheduler.accept_queue_notification(b).await.unwrap();
    let AcceptOutcome::Allocated { lease } = accepted else {
        panic!("expected allocation on accept, got {accepted:?}");
    };
    assert_eq!(lease.room_id, b);
    assert!(h.scheduler.queue_status(b).await.unwrap().is_none());
    assert!(h.scheduler.all_queue_statuses().await.unwrap().is_empty());

    h.advance(Duration::from_secs(60));
    let again = h.scheduler.request_virtual_browser(a).await.unwrap();
    assert_eq!(
        again,
        RequestOutcome::CooldownActive {
            remaining_seconds: 240
        }
    );
    assert_conserved(&h).await;
}

#[tokio::test(start_paused = true)]
async fn test_decline_passes_offer_to_next_room() {
    let h = TestHarness::new(1).await;
    let (a, b, c) = (RoomId::new(), RoomId::new(), RoomId::new());

    allocate(&h, a).await;
    assert_eq!(queue(&h, b).await, 1);
    h.advance(Duration::from_secs(1));
    assert_eq!(queue(&h, c).await, 2);

    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;
    assert_eq!(
        h.scheduler.queue_status(b).await.unwrap().unwrap().status,
        QueueEntryStatus::Notified
    );

    let declined = h.scheduler.decline_queue_notification(b).await.unwrap();
    assert_eq!(declined, DeclineOutcome::Declined);
    assert!(h.scheduler.queue_status(b).await.unwrap().is_none());
    assert_eq!(h.notifier.room_events(b), vec!["queued", "available", "queue_cancelled"]);

    let status_c = h.scheduler.queue_status(c).await.unwrap().unwrap();
    assert_eq!(status_c.status, QueueEntryStatus::Notified);
    assert_eq!(status_c.position, 1);

    assert_eq!(
        h.scheduler.decline_queue_notification(b).await.unwrap(),
        DeclineOutcome::NotNotified
    );
}

#[tokio::test]
async fn test_repeated_request_returns_same_lease() {
    let h = TestHarness::new(2).await;
    let a = RoomId::new();

    let first = allocate(&h, a).await;
    let second = h.scheduler.request_virtual_browser(a).await.unwrap();
    assert_eq!(second, RequestOutcome::AlreadyAllocated { lease: first });
    assert_eq!(h.leases.list_all().await.unwrap().len(), 1);
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 1);
}

#[tokio::test]
async fn test_repeated_request_while_queued_changes_nothing() {
    let h = TestHarness::new(1).await;
    let (a, b) = (RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;

    let again = h.scheduler.request_virtual_browser(b).await.unwrap();
    let RequestOutcome::AlreadyQueued { queue_status } = again else {
        panic!("expected already queued, got {again:?}");
    };
    assert_eq!(queue_status.position, 1);
    assert_eq!(h.scheduler.all_queue_statuses().await.unwrap().len(), 1);
    assert_eq!(h.notifier.room_events(b), vec!["queued"]);
}

#[tokio::test(start_paused = true)]
async fn test_free_slot_goes_to_queue_before_newcomers() {
    let h = TestHarness::new(2).await;
    let (a, b, c, d, e) = (
        RoomId::new(),
        RoomId::new(),
        RoomId::new(),
        RoomId::new(),
        RoomId::new(),
    );
    allocate(&h, a).await;
    allocate(&h, b).await;
    assert_eq!(queue(&h, c).await, 1);
    h.advance(Duration::from_secs(1));
    assert_eq!(queue(&h, d).await, 2);

    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 1);

    // A slot is free, but c holds the offer and d is ahead of e.
    h.advance(Duration::from_secs(1));
    assert_eq!(queue(&h, e).await, 2);
    let order: Vec<RoomId> = h
        .scheduler
        .all_queue_statuses()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.room_id)
        .collect();
    assert_eq!(order, vec![c, d, e]);
}

#[tokio::test(start_paused = true)]
async fn test_expired_lease_is_reclaimed_and_offered() {
    let h = TestHarness::new(1).await;
    let (a, b) = (RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;

    h.advance(Duration::from_secs(179 * 60));
    assert_eq!(h.scheduler.process_expired_sessions().await.unwrap(), 0);

    h.advance(Duration::from_secs(60));
    assert_eq!(h.scheduler.process_expired_sessions().await.unwrap(), 1);
    assert!(h.scheduler.lease_status(a).await.unwrap().is_none());
    assert_eq!(h.notifier.room_events(a), vec!["allocated", "expired"]);
    assert_eq!(
        h.scheduler.queue_status(b).await.unwrap().unwrap().status,
        QueueEntryStatus::Notified
    );

    let cooldown = h.scheduler.cooldown_status(a).await.unwrap();
    assert!(cooldown.active);
    assert_eq!(cooldown.remaining_seconds, 300);
    assert_conserved(&h).await;
}

#[tokio::test(start_paused = true)]
async fn test_lapsed_offer_returns_room_to_its_place() {
    let h = TestHarness::new(1).await;
    let (a, b, c) = (RoomId::new(), RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;
    h.advance(Duration::from_secs(1));
    queue(&h, c).await;

    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;
    let offered = h.scheduler.queue_status(b).await.unwrap().unwrap();
    assert_eq!(offered.remaining_seconds, Some(120));

    h.advance(Duration::from_secs(119));
    assert_eq!(h.scheduler.process_queue_notifications().await.unwrap(), 0);

    h.advance(Duration::from_secs(1));
    assert_eq!(h.scheduler.process_queue_notifications().await.unwrap(), 1);

    // b keeps its original place, so the freed offer goes back to b.
    let status_b = h.scheduler.queue_status(b).await.unwrap().unwrap();
    assert_eq!(status_b.status, QueueEntryStatus::Notified);
    assert_eq!(status_b.position, 1);
    assert_eq!(h.notifier.room_events(b), vec!["queued", "available", "available"]);
    let status_c = h.scheduler.queue_status(c).await.unwrap().unwrap();
    assert_eq!(status_c.status, QueueEntryStatus::Waiting);
    assert_eq!(status_c.position, 1);

    // An accept after the offer lapsed for good fails cleanly.
    h.advance(Duration::from_secs(120));
    h.scheduler.process_queue_notifications().await.unwrap();
    h.scheduler.cancel_queue(b).await.unwrap();
    assert_eq!(
        h.scheduler.accept_queue_notification(b).await.unwrap(),
        AcceptOutcome::NotNotified
    );
}

#[tokio::test]
async fn test_cancel_removes_entry() {
    let h = TestHarness::new(1).await;
    let (a, b, c) = (RoomId::new(), RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;
    queue(&h, c).await;

    assert_eq!(h.scheduler.cancel_queue(b).await.unwrap(), CancelOutcome::Cancelled);
    assert_eq!(h.scheduler.cancel_queue(b).await.unwrap(), CancelOutcome::NotQueued);
    assert_eq!(h.notifier.room_events(b), vec!["queued", "queue_cancelled"]);
    assert_eq!(h.scheduler.queue_status(c).await.unwrap().unwrap().position, 1);
}

#[tokio::test]
async fn test_accept_requires_notification() {
    let h = TestHarness::new(1).await;
    let (a, b) = (RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;

    assert_eq!(
        h.scheduler.accept_queue_notification(b).await.unwrap(),
        AcceptOutcome::NotNotified
    );
    assert_eq!(
        h.scheduler.queue_status(b).await.unwrap().unwrap().status,
        QueueEntryStatus::Waiting
    );
}

#[tokio::test(start_paused = true)]
async fn test_accept_without_free_slot_is_inconsistency() {
    let h = TestHarness::new(1).await;
    let (a, b) = (RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;
    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;

    // Something outside the scheduler grabs the offered slot.
    let stolen = h.pool.try_allocate().await.unwrap();
    assert!(stolen.is_some());

    let err = h.scheduler.accept_queue_notification(b).await.unwrap_err();
    assert!(err.is(ErrorKind::Inconsistency));
    assert!(h.scheduler.queue_status(b).await.unwrap().is_none());
    assert!(h.scheduler.lease_status(b).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_offer_prefers_controller_connection() {
    let h = TestHarness::new(1).await;
    let (a, b, c) = (RoomId::new(), RoomId::new(), RoomId::new());
    let controller = ConnectionId::new();
    h.notifier.connect(controller);
    h.scheduler.set_controller(b, Some(controller)).await.unwrap();
    // c names a controller that is not connected.
    h.scheduler
        .set_controller(c, Some(ConnectionId::new()))
        .await
        .unwrap();

    allocate(&h, a).await;
    queue(&h, b).await;
    h.advance(Duration::from_secs(1));
    queue(&h, c).await;

    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;
    assert_eq!(h.notifier.connection_events(controller), vec!["available"]);
    assert_eq!(h.notifier.room_events(b), vec!["queued"]);

    h.scheduler.decline_queue_notification(b).await.unwrap();
    assert_eq!(h.notifier.room_events(c), vec!["queued", "available"]);
}

#[tokio::test]
async fn test_release_without_lease() {
    let h = TestHarness::new(1).await;
    assert_eq!(
        h.scheduler
            .release_virtual_browser(RoomId::new())
            .await
            .unwrap(),
        ReleaseOutcome::NotAllocated
    );
}

#[tokio::test]
async fn test_restart_browser() {
    let h = TestHarness::new(1).await;
    let a = RoomId::new();
    assert_eq!(
        h.scheduler.restart_browser(a).await.unwrap(),
        RestartOutcome::NotAllocated
    );

    allocate(&h, a).await;
    assert_eq!(
        h.scheduler.restart_browser(a).await.unwrap(),
        RestartOutcome::Restarted
    );

    h.runtime.stop(&container("neko-1"));
    assert_eq!(
        h.scheduler.restart_browser(a).await.unwrap(),
        RestartOutcome::Failed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_exceed_capacity() {
    let h = Arc::new(TestHarness::new(3).await);
    let rooms: Vec<RoomId> = (0..24).map(|_| RoomId::new()).collect();

    let handles: Vec<_> = rooms
        .iter()
        .map(|room| {
            let h = h.clone();
            let room = *room;
            tokio::spawn(async move { h.scheduler.request_virtual_browser(room).await.unwrap() })
        })
        .collect();

    let mut allocated = 0;
    let mut positions = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            RequestOutcome::Allocated { .. } => allocated += 1,
            RequestOutcome::Queued { position, .. } => positions.push(position),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(allocated, 3);
    assert_eq!(positions.len(), 21);
    let leases = h.leases.list_all().await.unwrap();
    let containers: HashSet<_> = leases.iter().map(|l| l.container_id.clone()).collect();
    assert_eq!(containers.len(), 3);
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 0);

    let mut waiting: Vec<u32> = h
        .scheduler
        .all_queue_statuses()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.position)
        .collect();
    waiting.sort_unstable();
    assert_eq!(waiting, (1..=21).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_startup_reconciliation_repairs_leases() {
    let now = chrono::Utc::now();
    let duration = chrono::Duration::minutes(180);
    let leases = MemoryLeaseStore::new();

    let (kept, moved, vanished) = (RoomId::new(), RoomId::new(), RoomId::new());
    leases
        .create(&VirtualBrowserLease::grant(
            kept,
            &ContainerInfo::new("neko-1", "http://neko-1"),
            now,
            duration,
        ))
        .await
        .unwrap();
    leases
        .create(&VirtualBrowserLease::grant(
            moved,
            &ContainerInfo::new("neko-2", "http://old-host"),
            now,
            duration,
        ))
        .await
        .unwrap();
    leases
        .create(&VirtualBrowserLease::grant(
            vanished,
            &ContainerInfo::new("neko-9", "http://neko-9"),
            now,
            duration,
        ))
        .await
        .unwrap();

    let runtime = StaticContainerRuntime::new([
        ContainerInfo::new("neko-1", "http://neko-1"),
        ContainerInfo::new("neko-2", "http://neko-2"),
        ContainerInfo::new("neko-3", "http://neko-3"),
    ]);
    let h = TestHarness::build(runtime, leases, SchedulerConfig::default()).await;

    assert!(h.scheduler.lease_status(vanished).await.unwrap().is_none());
    assert!(h.scheduler.lease_status(kept).await.unwrap().is_some());
    assert_eq!(
        h.scheduler
            .lease_status(moved)
            .await
            .unwrap()
            .unwrap()
            .container_url,
        "http://neko-2"
    );

    let pool = h.scheduler.pool_status().await.unwrap();
    assert_eq!(pool.capacity, 3);
    assert_eq!(pool.available, 1);

    // A second pass finds nothing left to repair.
    let report = h.scheduler.reconcile_on_startup().await.unwrap();
    assert_eq!(report.running, 3);
    assert_eq!(report.stale_leases_removed, 0);
    assert_eq!(report.leases_updated, 0);
    assert_eq!(report.held, 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_request_waits_for_direct_claim() {
    let h = Arc::new(TestHarness::new(1).await);
    let (a, b, c) = (RoomId::new(), RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;

    // c finds an empty line and stalls inside its claim.
    h.pool.hold_next_claim();
    let direct = {
        let h = h.clone();
        tokio::spawn(async move { h.scheduler.request_virtual_browser(c).await.unwrap() })
    };
    h.pool.claim_waiting().await;

    let queued = {
        let h = h.clone();
        tokio::spawn(async move { h.scheduler.request_virtual_browser(b).await.unwrap() })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!queued.is_finished());

    h.pool.open_gate();
    assert!(matches!(direct.await.unwrap(), RequestOutcome::Allocated { .. }));
    assert!(matches!(
        queued.await.unwrap(),
        RequestOutcome::Queued { position: 1, .. }
    ));

    // b was never offered the slot c took.
    h.settle().await;
    assert_eq!(
        h.scheduler.queue_status(b).await.unwrap().unwrap().status,
        QueueEntryStatus::Waiting
    );
    assert_eq!(
        h.scheduler.accept_queue_notification(b).await.unwrap(),
        AcceptOutcome::NotNotified
    );
    assert_conserved(&h).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_return_is_retried_by_sweep() {
    let h = TestHarness::new(1).await;
    let (a, b) = (RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;

    h.pool.fail_releases(1);
    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 0);
    assert!(h.leases.list_all().await.unwrap().is_empty());

    assert_eq!(h.scheduler.process_expired_sessions().await.unwrap(), 0);
    assert_eq!(
        h.scheduler.queue_status(b).await.unwrap().unwrap().status,
        QueueEntryStatus::Notified
    );
    assert!(matches!(
        h.scheduler.accept_queue_notification(b).await.unwrap(),
        AcceptOutcome::Allocated { .. }
    ));
    assert_conserved(&h).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_return_after_expiry_is_retried() {
    let h = TestHarness::new(1).await;
    let a = RoomId::new();
    allocate(&h, a).await;

    h.pool.fail_releases(1);
    h.advance(Duration::from_secs(181 * 60));
    assert_eq!(h.scheduler.process_expired_sessions().await.unwrap(), 1);
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 0);
    assert!(h.scheduler.cooldown_status(a).await.unwrap().active);

    assert_eq!(h.scheduler.process_expired_sessions().await.unwrap(), 0);
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 1);
    assert_conserved(&h).await;
}

#[tokio::test(start_paused = true)]
async fn test_request_succeeds_once_cooldown_elapses() {
    let h = TestHarness::new(1).await;
    let a = RoomId::new();
    allocate(&h, a).await;
    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;

    h.advance(Duration::from_secs(299));
    assert_eq!(
        h.scheduler.request_virtual_browser(a).await.unwrap(),
        RequestOutcome::CooldownActive {
            remaining_seconds: 1
        }
    );

    h.advance(Duration::from_secs(1));
    assert!(!h.scheduler.cooldown_status(a).await.unwrap().active);
    let lease = allocate(&h, a).await;
    assert_eq!(lease.container_id, container("neko-1"));
}

#[tokio::test(start_paused = true)]
async fn test_released_room_rejoins_at_the_back() {
    let h = TestHarness::new(1).await;
    let (a, b, c) = (RoomId::new(), RoomId::new(), RoomId::new());
    allocate(&h, a).await;
    queue(&h, b).await;
    h.scheduler.release_virtual_browser(a).await.unwrap();
    h.settle().await;
    assert!(matches!(
        h.scheduler.accept_queue_notification(b).await.unwrap(),
        AcceptOutcome::Allocated { .. }
    ));

    h.advance(Duration::from_secs(1));
    assert_eq!(queue(&h, c).await, 1);

    // a served first, but once its cooldown is over it waits behind c.
    h.advance(Duration::from_secs(300));
    assert_eq!(queue(&h, a).await, 2);

    h.scheduler.release_virtual_browser(b).await.unwrap();
    h.settle().await;
    assert_eq!(
        h.scheduler.queue_status(c).await.unwrap().unwrap().status,
        QueueEntryStatus::Notified
    );
    let status_a = h.scheduler.queue_status(a).await.unwrap().unwrap();
    assert_eq!(status_a.status, QueueEntryStatus::Waiting);
    assert_eq!(status_a.position, 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_reclaims_lapsed_lease() {
    let h = TestHarness::new(1).await;
    let a = RoomId::new();
    allocate(&h, a).await;

    h.advance(Duration::from_secs(181 * 60));
    assert_eq!(
        h.scheduler.request_virtual_browser(a).await.unwrap(),
        RequestOutcome::CooldownActive {
            remaining_seconds: 300
        }
    );
    assert!(h.scheduler.lease_status(a).await.unwrap().is_none());
    assert_eq!(h.notifier.room_events(a), vec!["allocated", "expired"]);
    assert_eq!(h.scheduler.pool_status().await.unwrap().available, 1);
    assert_conserved(&h).await;
}
