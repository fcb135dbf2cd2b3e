//! The virtual browser scheduler and its supporting tasks.

mod follow_up;
pub mod outcome;
mod reconciler;
pub mod scheduler;

pub use outcome::{
    AcceptOutcome, CancelOutcome, DeclineOutcome, ReleaseOutcome, RequestOutcome, RestartOutcome,
};
pub use reconciler::ReconcileReport;
pub use scheduler::{SchedulerBackends, VirtualBrowserScheduler};
