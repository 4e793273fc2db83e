//! On-disk cluster state.
//!
//! Layout: `<config-root>/<tool-name>/<cluster-name>/config.json`. A cluster
//! exists for `list` exactly when its directory exists.

use crate::error::ProvisionError;
use crate::state::ClusterState;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct ClusterStore {
    root: PathBuf,
}

impl ClusterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the per-user config directory for `tool_name`.
    pub fn for_user(tool_name: &str) -> Result<Self, ProvisionError> {
        let base = dirs::config_dir().ok_or_else(|| {
            ProvisionError::Config("Unable to determine user config directory".to_string())
        })?;
        Ok(Self::new(base.join(tool_name)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (if needed) and return the directory for `name`.
    pub fn create_cluster_dir(&self, name: &str) -> Result<PathBuf, ProvisionError> {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)?;
        tracing::debug!("[Store] Cluster directory ready: {}", dir.display());
        Ok(dir)
    }

    /// Directory for an existing cluster.
    pub fn cluster_dir(&self, name: &str) -> Result<PathBuf, ProvisionError> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(ProvisionError::ClusterNotFound(name.to_string()));
        }
        Ok(dir)
    }

    pub fn state_file(&self, name: &str) -> PathBuf {
        self.root.join(name).join(STATE_FILE)
    }

    pub fn save(&self, state: &ClusterState) -> Result<PathBuf, ProvisionError> {
        let dir = self.create_cluster_dir(&state.name)?;
        let path = dir.join(STATE_FILE);
        let body = serde_json::to_string_pretty(state)?;
        std::fs::write(&path, body)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("[Store] Saved cluster {} to {}", state.name, path.display());
        Ok(path)
    }

    /// Raw persisted document, as printed by `describe`.
    pub fn read_raw(&self, name: &str) -> Result<String, ProvisionError> {
        let path = self.state_file(name);
        if !path.is_file() {
            return Err(ProvisionError::ClusterNotFound(name.to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    pub fn load(&self, name: &str) -> Result<ClusterState, ProvisionError> {
        let raw = self.read_raw(name)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Names of all clusters with a directory under the root, sorted.
    pub fn list(&self) -> Result<Vec<String>, ProvisionError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut clusters = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                clusters.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        clusters.sort();
        Ok(clusters)
    }

    /// Remove the directory this store keeps for `name`.
    pub fn remove(&self, name: &str) -> Result<(), ProvisionError> {
        let dir = self.cluster_dir(name)?;
        std::fs::remove_dir_all(&dir)?;
        tracing::info!("[Store] Removed {}", dir.display());
        Ok(())
    }
}
