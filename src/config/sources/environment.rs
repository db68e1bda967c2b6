//! Environment variable source: SYNCSTORE__* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "SYNCSTORE";

/// Environment overlay; `SYNCSTORE__CACHE__UPDATE_INTERVAL_MS=0` sets
/// `cache.update_interval_ms`.
pub fn source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(source())
}
