//! Container runtime configuration.

use serde::{Deserialize, Serialize};

/// One container known to the static runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Runtime name of the container.
    pub id: String,
    /// Address clients use to reach the browser.
    pub url: String,
}

/// Container runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The fixed set of containers that make up the pool.
    #[serde(default = "default_containers")]
    pub containers: Vec<ContainerSpec>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            containers: default_containers(),
        }
    }
}

fn default_containers() -> Vec<ContainerSpec> {
    vec![ContainerSpec {
        id: "neko-1".to_string(),
        url: "http://localhost:8080".to_string(),
    }]
}
