//! StorageConfig and path resolution for the channel backend.

use super::paths::xdg_root;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Channels live in process memory and vanish on exit
    #[default]
    Memory,
    /// Channels persist in a sled database
    Sled,
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database directory (relative to the data root); None uses the XDG data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database directory for a server rooted at `root`.
    pub fn resolve_path(&self, root: &Path) -> Result<PathBuf, ApiError> {
        match &self.path {
            Some(path) if path.is_absolute() => Ok(path.clone()),
            Some(path) => Ok(root.join(path)),
            None => Ok(xdg_root::root_data_dir(root)?.join("db")),
        }
    }
}
