//! Shared domain value types.

pub mod clock;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{ConnectionId, ContainerId, RoomId};
