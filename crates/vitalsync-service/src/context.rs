//! Engine context shared by the flush worker and the reconciler.
//!
//! The store is the only shared mutable state. It sits behind a
//! `tokio::sync::Mutex` and is locked for one store call at a time, never
//! across a network request.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use vitalsync_core::{CredentialResolver, CredentialSource, HistorySource, TelemetrySink};
use vitalsync_store::Store;

use crate::config::Config;

/// Shared engine state.
pub struct EngineContext {
    /// The record store (wrapped in Mutex for thread-safe access).
    pub store: Mutex<Store>,
    /// Push target for outbound telemetry.
    pub sink: Arc<dyn TelemetrySink>,
    /// Authoritative remote history.
    pub history: Arc<dyn HistorySource>,
    /// Single-flight credential lookup.
    pub credentials: CredentialResolver,
    /// Configuration.
    pub config: Config,
}

impl EngineContext {
    /// Create the context.
    ///
    /// Records in `syncing` are left alone: another engine over the same
    /// database may be pushing them. See [`EngineContext::recover_in_flight`].
    pub fn new(
        store: Store,
        sink: Arc<dyn TelemetrySink>,
        history: Arc<dyn HistorySource>,
        credentials: Arc<dyn CredentialSource>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            sink,
            history,
            credentials: CredentialResolver::new(credentials),
            config,
        })
    }

    /// Return records left in `syncing` by an interrupted run to `dirty`.
    ///
    /// Only the long-running worker process should call this, before its
    /// first cycle.
    pub async fn recover_in_flight(&self) -> Result<usize, vitalsync_store::Error> {
        let recovered = self.store.lock().await.recover_in_flight()?;
        if recovered > 0 {
            info!("Returned {} interrupted record(s) to the queue", recovered);
        }
        Ok(recovered)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
