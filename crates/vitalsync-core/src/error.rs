//! Error types for vitalsync-core.
//!
//! These errors describe failures of the remote collaborators (push,
//! history fetch, credential resolution). None of them is fatal to the
//! engine:
//!
//! | Error | Where it surfaces | Engine reaction |
//! |-------|-------------------|-----------------|
//! | push failure (any variant) | flush cycle | record back to `dirty`, cycle halted |
//! | history fetch failure | reconciliation | remote set treated as empty |
//! | [`Error::CredentialsUnavailable`] | flush cycle | cycle aborted, no state change |
//!
//! A push timeout is reported by the push collaborator like any other
//! failure; the engine does not distinguish it.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by remote collaborators.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The remote endpoint could not be reached.
    #[cfg(feature = "http")]
    #[error("Remote not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP transport or body error.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The configured base URL is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The remote response did not match any supported shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The operation did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The remote refused the record.
    #[error("Rejected by remote: {0}")]
    Rejected(String),

    /// No usable device identity could be resolved.
    #[error("Delivery credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using vitalsync-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
