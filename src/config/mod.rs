//! Server configuration
//!
//! Layered through the `config` crate: built-in defaults, the global file,
//! the file in the data root, then `SYNCSTORE__*` environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;
pub mod storage;

pub use facade::ConfigLoader;
pub use storage::{StorageBackend, StorageConfig};

use crate::access::AccessTable;
use crate::server::SYSTEM_CHANNELS;
use crate::error::ApiError;
use crate::logging::{self, LoggingConfig};
use crate::sync::DEFAULT_CACHE_UPDATE_INTERVAL;
use crate::types::RightId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

fn default_update_interval_ms() -> u64 {
    DEFAULT_CACHE_UPDATE_INTERVAL.as_millis() as u64
}

/// Staleness window shared by the synchronized structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Milliseconds between refreshes; 0 refreshes on every access
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

impl CacheConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

/// Declared channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Known right ids; when set, every right in `access` must be listed
    #[serde(default)]
    pub access_rights: Vec<RightId>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// rightId -> capabilities; empty disables access checks
    #[serde(default)]
    pub access: AccessTable,

    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Check cross-field constraints the deserializer cannot express
    pub fn validate(&self) -> Result<(), ApiError> {
        if !self.access_rights.is_empty() {
            let known: BTreeSet<&str> = self.access_rights.iter().map(String::as_str).collect();
            if let Some(unknown) = self.access.rights().find(|right| !known.contains(right)) {
                return Err(ApiError::ConfigError(format!(
                    "Access table grants unknown right '{}'",
                    unknown
                )));
            }
        }
        if let Some(name) = self.channels.keys().find(|name| name.trim().is_empty()) {
            return Err(ApiError::ConfigError(format!(
                "Invalid channel name '{}'",
                name
            )));
        }
        logging::validate(&self.logging)
    }

    /// Declared channels plus the system channels, sorted
    pub fn channel_names(&self) -> BTreeSet<String> {
        self.channels
            .keys()
            .cloned()
            .chain(SYSTEM_CHANNELS.iter().map(|name| name.to_string()))
            .collect()
    }

    /// Render the effective configuration
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render configuration: {}", e)))
    }
}
