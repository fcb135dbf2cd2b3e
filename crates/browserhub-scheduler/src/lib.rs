//! # browserhub-scheduler
//!
//! Admission and scheduling of a fixed set of virtual browser containers
//! shared by many rooms.
//!
//! ```text
//! VirtualBrowserScheduler
//!   ├── AdmissionQueue  (fair FIFO, waiting → notified → resolved)
//!   │     └── QueueStore (memory mutex | Redis lock + snapshot)
//!   ├── ContainerPool   (atomic claim/return of container slots)
//!   ├── LeaseStore      (one lease per room, one per container)
//!   ├── RoomStore       (cooldown anchor, controller connection)
//!   ├── Notifier        (room / connection events)
//!   └── ContainerRuntime
//! ```
//!
//! Every backend comes in a process-local flavour and, with the
//! `redis-backend` feature, a Redis flavour that is safe across nodes.
//! Fairness and state-machine rules live once, in [`queue::QueueState`]
//! and [`service::VirtualBrowserScheduler`].

pub mod pool;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod service;
pub mod store;

pub use pool::ContainerPool;
pub use queue::{AdmissionQueue, QueueStore};
pub use service::{SchedulerBackends, VirtualBrowserScheduler};
