/// Cluster manager settings
/// Loaded from kmanager.toml
use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "kmanager.toml";

/// Cluster manager settings
/// Loaded from kmanager.toml, every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory name under the user config dir
    pub tool_name: String,

    /// Remote application index
    pub index_url: String,

    /// GKE cluster shape
    pub cluster_version: String,
    pub machine_type: String,
    pub num_nodes: u32,
    pub disk_size_gb: u32,

    /// Description attached to the managed DNS zone
    pub zone_description: String,

    /// `kubectl wait` timeout for pod readiness
    pub pod_ready_timeout_secs: u64,

    /// Certificate secret polling
    pub secret_poll_interval_secs: u64,
    pub secret_poll_timeout_secs: u64,

    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_name: "kmanager".to_string(),
            index_url: "https://storage.googleapis.com/kmanager/index.yaml".to_string(),
            cluster_version: "1.16.13-gke.401".to_string(),
            machine_type: "n1-standard-1".to_string(),
            num_nodes: 2,
            disk_size_gb: 10,
            zone_description: "kubepaas managed zone".to_string(),
            pod_ready_timeout_secs: 20,
            secret_poll_interval_secs: 5,
            secret_poll_timeout_secs: 300,
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from the working directory or `config_root`
    pub fn load(config_root: &Path) -> Result<Self, ProvisionError> {
        let candidates = vec![PathBuf::from(SETTINGS_FILE), config_root.join(SETTINGS_FILE)];

        for path in candidates {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    ProvisionError::Config(format!("Failed to read {:?}: {}", path, e))
                })?;

                let settings = Self::from_toml(&content).map_err(|e| {
                    ProvisionError::Config(format!("Failed to parse {:?}: {}", path, e))
                })?;

                tracing::info!("Loaded settings from {:?}", path);
                return Ok(settings);
            }
        }

        tracing::warn!("No {} found, using defaults", SETTINGS_FILE);
        Ok(Self::default())
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn pod_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_ready_timeout_secs)
    }

    pub fn secret_poll_interval(&self) -> Duration {
        Duration::from_secs(self.secret_poll_interval_secs)
    }

    pub fn secret_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.secret_poll_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
