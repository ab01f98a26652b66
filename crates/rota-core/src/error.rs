//! Error types for rota-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using rota-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rota-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shared document exists but cannot be parsed
    #[error("Shared document at {path} is corrupted: {source}")]
    CorruptDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Shared document has not been created yet
    #[error("Shared document not initialized at {0}")]
    NotInitialized(PathBuf),

    /// Save gave up after exhausting its retry budget
    #[error("Save failed after {attempts} attempt(s): {source}")]
    SaveFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Conflict resolution requested with nothing pending
    #[error("No pending sync conflict to resolve")]
    NoPendingConflict,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid sync configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

impl Error {
    /// Whether the error is worth another save attempt.
    ///
    /// Missing or corrupted documents will not fix themselves between
    /// attempts, so they fail fast.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_))
    }
}
