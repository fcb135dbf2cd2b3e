//! Collaborators the scheduler consumes.
//!
//! Persistence, realtime delivery and container provisioning live outside
//! this crate; the scheduler only sees these traits.

pub mod lease_store;
pub mod notifier;
pub mod room_store;
pub mod runtime;

pub use lease_store::LeaseStore;
pub use notifier::Notifier;
pub use room_store::RoomStore;
pub use runtime::ContainerRuntime;
