//! Local file source: `<root>/syncstore.toml`, optional

use config::builder::DefaultState;
use config::{ConfigBuilder, File, FileFormat};
use std::path::{Path, PathBuf};

pub const LOCAL_CONFIG_FILE: &str = "syncstore.toml";

pub fn path(root: &Path) -> PathBuf {
    root.join(LOCAL_CONFIG_FILE)
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    root: &Path,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(File::from(path(root)).format(FileFormat::Toml).required(false))
}
