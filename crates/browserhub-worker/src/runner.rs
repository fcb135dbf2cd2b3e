//! Maintenance runner: periodic sweeps until shutdown.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing;

use browserhub_core::config::WorkerConfig;
use browserhub_scheduler::VirtualBrowserScheduler;

use crate::sweep::run_once;

/// Runs the maintenance sweeps on a fixed interval
#[derive(Debug, Clone)]
pub struct MaintenanceRunner {
    /// Scheduler to sweep
    scheduler: VirtualBrowserScheduler,
    /// Time between sweeps
    interval: Duration,
}

impl MaintenanceRunner {
    /// Create a new runner
    pub fn new(scheduler: VirtualBrowserScheduler, config: &WorkerConfig) -> Self {
        Self {
            scheduler,
            interval: Duration::from_secs(config.maintenance_interval_seconds.max(1)),
        }
    }

    /// Run until the cancel signal is received. Returns the number of
    /// passes made.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) -> u64 {
        tracing::info!(
            "Maintenance runner started, interval={}s",
            self.interval.as_secs()
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut passes = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_once(&self.scheduler).await;
                    passes += 1;
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Maintenance runner shutting down");
                        break;
                    }
                }
            }
        }
        passes
    }
}
