//! One maintenance pass.

use serde::Serialize;
use tracing;

use browserhub_scheduler::VirtualBrowserScheduler;

/// What a maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Leases reclaimed after expiry
    pub expired_leases: u32,
    /// Offers that lapsed and went back to the queue
    pub expired_notifications: u32,
    /// Sweeps that failed this pass
    pub failures: u32,
}

/// Run both sweeps once. A failing sweep is logged and does not stop
/// the other.
pub async fn run_once(scheduler: &VirtualBrowserScheduler) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    match scheduler.process_expired_sessions().await {
        Ok(count) => report.expired_leases = count,
        Err(e) => {
            tracing::error!("Lease expiry sweep failed: {}", e);
            report.failures += 1;
        }
    }

    match scheduler.process_queue_notifications().await {
        Ok(count) => report.expired_notifications = count,
        Err(e) => {
            tracing::error!("Queue notification sweep failed: {}", e);
            report.failures += 1;
        }
    }

    if report.expired_leases > 0 || report.expired_notifications > 0 {
        tracing::info!(
            "Maintenance sweep: {} leases expired, {} notifications expired",
            report.expired_leases,
            report.expired_notifications
        );
    } else {
        tracing::trace!("Maintenance sweep found nothing to do");
    }
    report
}
