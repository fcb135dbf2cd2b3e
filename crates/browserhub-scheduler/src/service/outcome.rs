//! Typed results of scheduler operations.
//!
//! Rejections a room is expected to see (cooldown, already queued, not
//! notified, ...) are variants here rather than errors.

use serde::Serialize;

use browserhub_core::types::ContainerId;
use browserhub_entity::lease::VirtualBrowserLease;
use browserhub_entity::queue::QueueStatusView;

/// Result of asking for a virtual browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// A container was free and no one was waiting.
    Allocated {
        /// The new lease.
        lease: VirtualBrowserLease,
    },
    /// The room already holds a lease; it is returned unchanged.
    AlreadyAllocated {
        /// The existing lease.
        lease: VirtualBrowserLease,
    },
    /// The room joined the queue.
    Queued {
        /// Rank among waiting rooms.
        position: u32,
        /// Rooms waiting or notified.
        queue_length: u32,
    },
    /// The room was already in line. Nothing changed.
    AlreadyQueued {
        /// Its current status.
        queue_status: QueueStatusView,
    },
    /// The room released a browser too recently.
    CooldownActive {
        /// Whole seconds until the room may ask again.
        remaining_seconds: u64,
    },
}

/// Result of accepting a queue notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AcceptOutcome {
    /// The offer was taken and a lease granted.
    Allocated {
        /// The new lease.
        lease: VirtualBrowserLease,
    },
    /// The room already held a lease.
    AlreadyAllocated {
        /// The existing lease.
        lease: VirtualBrowserLease,
    },
    /// The room holds no outstanding offer (never notified, expired, or
    /// already resolved).
    NotNotified,
}

/// Result of declining a queue notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeclineOutcome {
    /// The room left the queue.
    Declined,
    /// The room holds no outstanding offer.
    NotNotified,
}

/// Result of leaving the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The room's entry was removed.
    Cancelled,
    /// The room was not in line.
    NotQueued,
}

/// Result of giving up a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The lease ended. The container returns to the pool after the grace delay.
    Released {
        /// The container being returned.
        container_id: ContainerId,
    },
    /// The room held no lease.
    NotAllocated,
}

/// Result of restarting the browser process of a room's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RestartOutcome {
    /// The runtime restarted the process.
    Restarted,
    /// The runtime could not restart it.
    Failed,
    /// The room holds no active lease.
    NotAllocated,
}

/// Internal result of turning a pool claim into a lease.
#[derive(Debug)]
pub(crate) enum LeaseAttempt {
    /// A new lease was stored.
    Granted(VirtualBrowserLease),
    /// The room won a lease concurrently; the claimed slot was returned.
    Existing(VirtualBrowserLease),
}
