//! Merge policy: defaults form the lowest layer every source overrides.

use crate::config::ServerConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with `ServerConfig::default()`
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&ServerConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
