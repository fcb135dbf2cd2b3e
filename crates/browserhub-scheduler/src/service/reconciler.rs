//! Startup reconciliation of leases and the pool against the runtime.
//!
//! A restart can leave lease records pointing at containers that no
//! longer exist, and the pool must be rebuilt from what is running.

use serde::Serialize;
use tracing::{info, warn};

use browserhub_core::result::AppResult;
use browserhub_core::types::ContainerId;

use super::scheduler::VirtualBrowserScheduler;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Containers the runtime reported as running.
    pub running: u32,
    /// Leases deleted because their container vanished.
    pub stale_leases_removed: u32,
    /// Leases whose container address changed.
    pub leases_updated: u32,
    /// Containers held by surviving leases.
    pub held: u32,
    /// Rooms notified by the queue pass that follows.
    pub notified: u32,
}

impl VirtualBrowserScheduler {
    /// Bring leases and the pool in line with the running containers,
    /// then serve the queue.
    ///
    /// 1. Initialize the runtime and list running containers.
    /// 2. Delete leases whose container is gone; refresh changed addresses.
    /// 3. Seed the pool, marking containers of surviving leases as held.
    /// 4. Run a queue processing pass.
    pub async fn reconcile_on_startup(&self) -> AppResult<ReconcileReport> {
        if !self.runtime.initialize().await? {
            warn!("Container runtime reported nothing to serve");
        }
        let running = self.runtime.list_running().await?;
        let mut report = ReconcileReport {
            running: running.len() as u32,
            ..ReconcileReport::default()
        };

        let mut held: Vec<ContainerId> = Vec::new();
        for mut lease in self.leases.list_all().await? {
            let Some(container) = running.iter().find(|c| c.id == lease.container_id) else {
                warn!(
                    room_id = %lease.room_id,
                    container_id = %lease.container_id,
                    "Removing lease for a container that is no longer running"
                );
                if self.leases.delete(lease.room_id).await? {
                    report.stale_leases_removed += 1;
                }
                continue;
            };

            if container.url != lease.container_url {
                info!(
                    room_id = %lease.room_id,
                    container_id = %lease.container_id,
                    url = %container.url,
                    "Lease container address changed"
                );
                lease.container_url = container.url.clone();
                self.leases.update(&lease).await?;
                report.leases_updated += 1;
            }
            held.push(lease.container_id);
        }
        report.held = held.len() as u32;

        let ids: Vec<ContainerId> = running.into_iter().map(|c| c.id).collect();
        self.pool.seed(&ids, &held).await?;
        // Seeding freed every unheld container, including failed returns.
        self.pending_returns.clear();

        report.notified = self.process_queue().await?;

        info!(
            running = report.running,
            stale_leases_removed = report.stale_leases_removed,
            leases_updated = report.leases_updated,
            held = report.held,
            notified = report.notified,
            "Startup reconciliation completed"
        );
        Ok(report)
    }
}
