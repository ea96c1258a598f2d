//! Error types for vitalsync-store.

use std::path::PathBuf;

use vitalsync_types::SyncState;

/// Result type for vitalsync-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vitalsync-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No record with this id.
    #[error("Record not found: {0}")]
    RecordNotFound(i64),

    /// The requested delivery-state edge is not allowed.
    #[error("Record {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: SyncState,
        to: SyncState,
    },

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
