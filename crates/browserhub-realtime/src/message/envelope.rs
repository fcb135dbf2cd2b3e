//! Message envelope wrapping scheduler events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use browserhub_entity::event::BrowserEvent;

use super::target::Target;

/// Envelope wrapping an event with delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique message ID for deduplication
    pub id: Uuid,
    /// Who the event is for
    pub target: Target,
    /// The event payload
    pub event: BrowserEvent,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Wrap an event addressed to `target`
    pub fn new(target: Target, event: BrowserEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            event,
            timestamp: Utc::now(),
        }
    }
}
