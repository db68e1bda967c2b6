//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::ServerConfig;
use crate::error::ApiError;
use std::path::Path;
use tracing::debug;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from files and environment.
    pub fn load(root: &Path) -> Result<ServerConfig, ApiError> {
        let config = MergeService::load(root)?;
        config.validate()?;
        debug!(root = %root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<ServerConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> ServerConfig {
        ServerConfig::default()
    }
}
