//! Error types for parsing in vitalsync-types.

use thiserror::Error;

/// Errors that can occur when parsing VitalSync values from text.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The text is not one of `dirty`, `syncing` or `synced`.
    #[error("Unknown sync state: {0}")]
    UnknownSyncState(String),

    /// The text is not a supported history range.
    #[error("Unknown history range '{0}': expected 24h, 7d or 30d")]
    UnknownRange(String),
}

/// Result type alias using vitalsync-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
