//! Delegate configuration.
//!
//! Parameters are plain data and can be loaded from TOML:
//!
//! ```toml
//! enable_motion_samples = true
//! delegate_root = "/SceneLink"
//! ```

use std::path::Path;

use scenelink_core::ScenePath;
use serde::Deserialize;

use crate::error::SyncError;

/// Runtime parameters of a [`SceneDelegate`](crate::SceneDelegate).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DelegateParams {
    /// Produce a second transform sample one time-step ahead for motion
    /// blur. When disabled both cached samples are identical and
    /// [`sample_transform`](crate::DagAdapter::sample_transform) returns a
    /// single sample.
    pub enable_motion_samples: bool,
    /// Prim under which every adapted node is inserted.
    pub delegate_root: String,
}

impl Default for DelegateParams {
    fn default() -> Self {
        Self {
            enable_motion_samples: false,
            delegate_root: "/SceneLink".to_owned(),
        }
    }
}

impl DelegateParams {
    /// Parse parameters from a TOML string. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, SyncError> {
        let params: Self = toml::from_str(content)?;
        params.root_path()?;
        Ok(params)
    }

    /// Load parameters from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path).map_err(|source| SyncError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load parameters, falling back to defaults if the file is missing or
    /// malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(params) => {
                log::info!("Loaded delegate params from {}", path.display());
                params
            }
            Err(e) => {
                log::warn!("{e}; using default delegate params");
                Self::default()
            }
        }
    }

    /// Returns `delegate_root` as a validated path.
    pub fn root_path(&self) -> Result<ScenePath, SyncError> {
        Ok(ScenePath::new(&self.delegate_root)?)
    }
}
