//! # browserhub-worker
//!
//! Background maintenance for the scheduler: reclaims expired leases and
//! returns rooms whose offer lapsed to the queue, on a fixed interval.

pub mod runner;
pub mod sweep;

pub use runner::MaintenanceRunner;
pub use sweep::{MaintenanceReport, run_once};
