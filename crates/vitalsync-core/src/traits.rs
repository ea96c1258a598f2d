//! Trait abstractions for the engine's remote collaborators.
//!
//! The engine talks to the outside world only through these traits, so the
//! HTTP client in [`crate::remote`] and the mocks in [`crate::mock`] are
//! interchangeable.

use async_trait::async_trait;
use time::OffsetDateTime;

use vitalsync_types::{Credentials, TelemetryPayload};

use crate::error::Result;
use crate::observation::RemoteObservation;

/// Delivers one telemetry payload to the remote system.
///
/// # Example
///
/// ```ignore
/// use vitalsync_core::{TelemetrySink, Result};
/// use vitalsync_types::TelemetryPayload;
///
/// async fn deliver<S: TelemetrySink>(sink: &S, payload: &TelemetryPayload) -> Result<()> {
///     sink.push(payload).await
/// }
/// ```
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Push one payload. Any error (including a timeout) counts as a failure.
    async fn push(&self, payload: &TelemetryPayload) -> Result<()>;
}

/// Reads authoritative history from the remote system.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch observations of `vital_type` in `[from, to]`.
    async fn fetch_history(
        &self,
        vital_type: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<RemoteObservation>>;
}

/// Looks up the delivery identity of this device.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Resolve credentials. `Ok(None)` means the profile has no identity yet.
    async fn resolve(&self) -> Result<Option<Credentials>>;
}

/// Fixed credentials, typically from configuration.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Wrap fixed credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn resolve(&self) -> Result<Option<Credentials>> {
        Ok(Some(self.credentials.clone()))
    }
}
