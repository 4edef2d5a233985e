//! Error types for addonsync-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for addonsync operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote sync is not configured (no credentials)")]
    NotConfigured,

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Authorization was not completed in time")]
    AuthorizationTimeout,

    #[error("Corrupt profile record {source_name}: {message}")]
    CorruptRecord {
        source_name: String,
        message: String,
    },

    #[error("Backup into {path} could not be completed: {message}")]
    BackupIncomplete { path: PathBuf, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Another operation is already running: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for failures that abort the whole operation.
    ///
    /// Corrupt records and missing items are isolated per record; everything
    /// else (credentials, network, incomplete backups, local IO) is surfaced
    /// to the caller as-is.
    pub fn is_systemic(&self) -> bool {
        !matches!(self, Self::CorruptRecord { .. } | Self::NotFound(_))
    }

    pub(crate) fn corrupt(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::CorruptRecord {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteUnavailable(err.to_string())
    }
}

/// Result type alias for addonsync operations
pub type Result<T> = std::result::Result<T, Error>;
