//! Runtime over a fixed, externally managed set of containers.
//!
//! The containers are started by the deployment (compose file, systemd
//! units, ...) and listed in configuration. This adapter only tracks
//! which of them are currently considered running.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use browserhub_core::config::RuntimeConfig;
use browserhub_core::result::AppResult;
use browserhub_core::types::ContainerId;
use browserhub_entity::container::ContainerInfo;

use crate::ports::ContainerRuntime;

/// Container runtime backed by a static container list.
#[derive(Debug, Clone, Default)]
pub struct StaticContainerRuntime {
    containers: Arc<DashMap<ContainerId, ContainerInfo>>,
}

impl StaticContainerRuntime {
    /// Creates a runtime serving `containers`.
    pub fn new(containers: impl IntoIterator<Item = ContainerInfo>) -> Self {
        let map = DashMap::new();
        for container in containers {
            map.insert(container.id.clone(), container);
        }
        Self {
            containers: Arc::new(map),
        }
    }

    /// Creates a runtime from the `[runtime]` configuration section.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config
                .containers
                .iter()
                .map(|spec| ContainerInfo::new(spec.id.as_str(), spec.url.as_str())),
        )
    }

    /// Register or replace a running container.
    pub fn start(&self, container: ContainerInfo) {
        info!(container_id = %container.id, url = %container.url, "Container registered");
        self.containers.insert(container.id.clone(), container);
    }

    /// Mark a container as gone. Returns `true` if it was running.
    pub fn stop(&self, container_id: &ContainerId) -> bool {
        let removed = self.containers.remove(container_id).is_some();
        if removed {
            info!(container_id = %container_id, "Container deregistered");
        }
        removed
    }
}

#[async_trait]
impl ContainerRuntime for StaticContainerRuntime {
    async fn initialize(&self) -> AppResult<bool> {
        let count = self.containers.len();
        if count == 0 {
            warn!("No virtual browser containers configured");
            return Ok(false);
        }
        info!(containers = count, "Static container runtime initialized");
        Ok(true)
    }

    async fn allocate(&self, container_id: &ContainerId) -> AppResult<Option<ContainerInfo>> {
        Ok(self.containers.get(container_id).map(|c| c.value().clone()))
    }

    async fn return_to_pool(&self, container_id: &ContainerId) -> AppResult<()> {
        debug!(container_id = %container_id, "Container reset after lease");
        Ok(())
    }

    async fn restart_process(&self, container_id: &ContainerId) -> AppResult<bool> {
        let running = self.containers.contains_key(container_id);
        if running {
            info!(container_id = %container_id, "Browser process restart requested");
        } else {
            warn!(container_id = %container_id, "Restart requested for unknown container");
        }
        Ok(running)
    }

    async fn list_running(&self) -> AppResult<Vec<ContainerInfo>> {
        let mut running: Vec<ContainerInfo> =
            self.containers.iter().map(|c| c.value().clone()).collect();
        running.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browserhub_core::config::ContainerSpec;

    #[tokio::test]
    async fn test_from_config_lists_sorted() {
        let runtime = StaticContainerRuntime::from_config(&RuntimeConfig {
            containers: vec![
                ContainerSpec {
                    id: "neko-2".into(),
                    url: "http://neko-2".into(),
                },
                ContainerSpec {
                    id: "neko-1".into(),
                    url: "http://neko-1".into(),
                },
            ],
        });

        assert!(runtime.initialize().await.unwrap());
        let ids: Vec<String> = runtime
            .list_running()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, vec!["neko-1", "neko-2"]);
    }

    #[tokio::test]
    async fn test_stopped_container_cannot_be_allocated() {
        let runtime = StaticContainerRuntime::new([ContainerInfo::new("neko-1", "http://neko-1")]);
        let id = ContainerId::from("neko-1");
        assert!(runtime.allocate(&id).await.unwrap().is_some());

        assert!(runtime.stop(&id));
        assert!(runtime.allocate(&id).await.unwrap().is_none());
        assert!(!runtime.restart_process(&id).await.unwrap());
        assert!(!runtime.initialize().await.unwrap());
    }
}
