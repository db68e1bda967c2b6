//! MergeService: orchestrates sources, applies merge policy, deserializes to ServerConfig.

use crate::config::sources::{environment, global_file, local_file};
use crate::config::ServerConfig;
use config::{ConfigError, File, FileFormat};
use std::path::Path;

use super::policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from the data root and standard sources.
    /// Precedence: defaults (lowest) -> global file -> root file -> environment (highest).
    pub fn load(root: &Path) -> Result<ServerConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder);
        let builder = local_file::add_to_builder(builder, root);
        let builder = environment::add_to_builder(builder);

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<ServerConfig, ConfigError> {
        let builder = policy::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml));
        let builder = environment::add_to_builder(builder);

        builder.build()?.try_deserialize()
    }
}
