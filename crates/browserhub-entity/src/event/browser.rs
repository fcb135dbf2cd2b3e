//! Virtual browser lifecycle events.

use serde::{Deserialize, Serialize};

use crate::lease::VirtualBrowserLease;
use crate::queue::QueueStatusView;

/// Events delivered to rooms over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// The room joined the admission queue.
    Queued {
        /// Rank among waiting rooms.
        position: u32,
        /// Rooms waiting or notified, including this one.
        queue_length: u32,
    },
    /// A container is free and reserved for this room; respond in time.
    Available {
        /// The room's queue status including the response deadline.
        queue_status: QueueStatusView,
    },
    /// The room now holds a lease.
    Allocated {
        /// The granted lease.
        lease: VirtualBrowserLease,
    },
    /// The room gave up its lease.
    Released,
    /// The room's lease ran out.
    Expired,
    /// The room left the admission queue.
    QueueCancelled,
}

impl BrowserEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "queued",
            Self::Available { .. } => "available",
            Self::Allocated { .. } => "allocated",
            Self::Released => "released",
            Self::Expired => "expired",
            Self::QueueCancelled => "queue_cancelled",
        }
    }
}
