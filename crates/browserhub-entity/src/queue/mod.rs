//! Admission queue records.

pub mod entry;
pub mod notification;
pub mod status;

pub use entry::{QueueEntry, QueueEntryStatus};
pub use notification::NotificationEntry;
pub use status::QueueStatusView;
