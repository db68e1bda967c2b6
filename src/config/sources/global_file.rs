//! Global file source: `$XDG_CONFIG_HOME/syncstore/config.toml`, optional

use crate::config::paths::xdg_root;
use config::builder::DefaultState;
use config::{ConfigBuilder, File, FileFormat};

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    match xdg_root::global_config_path() {
        Ok(path) => builder.add_source(File::from(path).format(FileFormat::Toml).required(false)),
        Err(_) => builder,
    }
}
