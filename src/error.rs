//! Error taxonomy
//!
//! `StorageError` covers everything a channel or cache structure can report.
//! `ApiError` is the orchestration-level error used by the dispatcher, the
//! configuration layer and the CLI.

use crate::access::Capability;
use crate::types::RecordId;
use thiserror::Error;

/// Errors raised by channels and the structures synchronized against them
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Record already exists: {0}")]
    AlreadyExists(RecordId),

    #[error("Invalid filter pattern for field '{field}': {source}")]
    InvalidFilter {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("Backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// True for the expected business outcomes (missing or colliding ids)
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }
}

/// Errors raised by the request dispatcher, configuration and tooling
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No {capability} access")]
    AccessDenied { capability: Capability },

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
