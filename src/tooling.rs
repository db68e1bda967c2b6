//! Tooling & Integration Layer
//!
//! Command-line access to a sync core for inspection and scripting.

pub mod cli;

pub use cli::{load_config, Cli, CliContext, Commands};
