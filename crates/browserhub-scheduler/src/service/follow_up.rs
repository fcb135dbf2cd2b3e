//! Deferred container returns after an explicit release.

use std::time::Duration;

use tracing::{Instrument, error, info, info_span, warn};

use browserhub_core::types::{ContainerId, RoomId};

use super::scheduler::VirtualBrowserScheduler;

impl VirtualBrowserScheduler {
    /// Return a released container once client teardown had time to
    /// settle, then offer it to the queue.
    pub(crate) fn schedule_return(&self, room_id: RoomId, container_id: ContainerId) {
        let scheduler = self.clone();
        let grace = self.timings.release_grace;
        let span = info_span!("release_follow_up", room_id = %room_id, container_id = %container_id);

        self.follow_ups.spawn(
            async move {
                tokio::time::sleep(grace).await;

                if scheduler.return_container(&container_id).await {
                    info!("Container returned to pool");
                    scheduler.process_queue_logged().await;
                }
            }
            .instrument(span),
        );
    }

    /// Reset a container and free its slot. A slot that cannot be freed is
    /// remembered and retried by the next expiry sweep.
    pub(crate) async fn return_container(&self, container_id: &ContainerId) -> bool {
        if let Err(e) = self.runtime.return_to_pool(container_id).await {
            warn!(container_id = %container_id, error = %e, "Container reset failed; returning slot anyway");
        }
        match self.pool.release(container_id).await {
            Ok(_) => {
                self.pending_returns.remove(container_id);
                true
            }
            Err(e) => {
                error!(
                    container_id = %container_id,
                    error = %e,
                    "Failed to return container to pool; will retry"
                );
                self.pending_returns.insert(container_id.clone());
                false
            }
        }
    }

    /// Retry every container return that failed earlier. Returns the
    /// number of slots freed.
    pub(crate) async fn retry_pending_returns(&self) -> u32 {
        let pending: Vec<ContainerId> = self
            .pending_returns
            .iter()
            .map(|id| id.key().clone())
            .collect();
        let mut freed = 0;
        for container_id in pending {
            if self.return_container(&container_id).await {
                info!(container_id = %container_id, "Pending container return completed");
                freed += 1;
            }
        }
        freed
    }

    /// Wait until every pending container return has finished.
    pub async fn settle(&self) {
        self.follow_ups.close();
        self.follow_ups.wait().await;
        self.follow_ups.reopen();
    }

    /// Stop accepting follow-up work and drain what is pending, giving up
    /// after `timeout`. Returns `false` on timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.follow_ups.close();
        let pending = self.follow_ups.len();
        if pending > 0 {
            info!(pending = pending, "Waiting for pending container returns");
        }
        match tokio::time::timeout(timeout, self.follow_ups.wait()).await {
            Ok(()) => {
                if !self.pending_returns.is_empty() {
                    warn!(
                        pending = self.pending_returns.len(),
                        "Containers left unreturned; startup reconciliation will reclaim them"
                    );
                }
                true
            }
            Err(_) => {
                warn!(
                    pending = self.follow_ups.len(),
                    "Timed out waiting for container returns"
                );
                false
            }
        }
    }
}
