//! Centralized error types for maildirsync.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the maildirsync library.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The mailbox root does not exist or is not a directory.
    #[error("Cannot access mail directory '{path}': {reason}")]
    DirectoryAccess { path: PathBuf, reason: String },

    /// The directory walk itself failed partway (e.g. the root vanished).
    #[error("Directory walk under '{path}' failed: {reason}")]
    Walk { path: PathBuf, reason: String },

    /// A message could not be turned into an envelope.
    #[error("Parse error: {reason}")]
    Parse { reason: String },

    /// A flag code was empty or longer than one character.
    #[error("Invalid flag '{0}': a flag must be exactly one character")]
    InvalidFlag(String),

    /// A record with this path is already stored.
    #[error("A record for '{0}' already exists")]
    DuplicateKey(String),

    /// Any other storage-engine failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Convenience alias for `Result<T, SyncError>`.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Parse` variant from anything printable.
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}
