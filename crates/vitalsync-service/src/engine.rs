//! The engine facade: record, flush, reconcile.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use vitalsync_core::advertisement::decode;
use vitalsync_core::{
    CredentialSource, HistorySource, HttpRemote, RemoteOptions, StaticCredentials, TelemetrySink,
};
use vitalsync_store::{StateCounts, Store, StoredReading};
use vitalsync_types::{HistoryRange, Reading, SeriesPoint};

use crate::config::{Config, ConfigError};
use crate::context::EngineContext;
use crate::flush::{FlushOutcome, FlushStats, FlushWorker};
use crate::reconcile::Reconciler;

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] vitalsync_store::Error),
    #[error("Remote error: {0}")]
    Remote(#[from] vitalsync_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Queue and worker diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Records per delivery state.
    pub counts: StateCounts,
    /// Vital types present in the store.
    pub vital_types: Vec<String>,
    /// Whether periodic flushing is active.
    pub worker_running: bool,
    /// Worker counters.
    pub flush: FlushStats,
}

/// Telemetry synchronization engine.
#[derive(Debug)]
pub struct Engine {
    context: Arc<EngineContext>,
    worker: Arc<FlushWorker>,
    reconciler: Reconciler,
}

impl Engine {
    /// Create an engine over an existing context.
    pub fn new(context: Arc<EngineContext>) -> Self {
        let worker = FlushWorker::new(Arc::clone(&context));
        let reconciler = Reconciler::new(Arc::clone(&context));
        Self {
            context,
            worker,
            reconciler,
        }
    }

    /// Open the store and connect the HTTP remote described by `config`.
    ///
    /// Configured static credentials take precedence over the remote profile.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        config.validate()?;

        let store = Store::open(&config.storage.path)?.with_retention(config.storage.retention);

        let mut options = RemoteOptions::default().timeout(config.remote.timeout());
        if let Some(token) = &config.remote.api_token {
            options = options.api_token(token.clone());
        }
        let remote = Arc::new(HttpRemote::new(&config.remote.base_url, options)?);

        let credentials: Arc<dyn CredentialSource> = match config.profile.credentials() {
            Some(credentials) => {
                info!("Using configured device identity");
                Arc::new(StaticCredentials::new(credentials))
            }
            None => remote.clone(),
        };
        let sink: Arc<dyn TelemetrySink> = remote.clone();
        let history: Arc<dyn HistorySource> = remote;

        let context = EngineContext::new(store, sink, history, credentials, config);
        Ok(Self::new(context))
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// The flush worker.
    pub fn worker(&self) -> &Arc<FlushWorker> {
        &self.worker
    }

    /// Accept one reading: persist it as `dirty`, then optionally attempt delivery.
    ///
    /// A store failure is returned; a delivery failure leaves the record queued.
    pub async fn record(&self, reading: &Reading) -> Result<StoredReading, EngineError> {
        let record = self.context.store.lock().await.append(reading)?;
        debug!(
            "Recorded {} = {} (record {})",
            record.vital_type, record.value, record.id
        );
        self.optimistic_push().await;
        Ok(record)
    }

    /// Decode a captured broadcast and record every quantity it carries.
    ///
    /// Unrecognized or malformed payloads record nothing.
    pub async fn record_advertisement(
        &self,
        service_data: &HashMap<String, Vec<u8>>,
        captured_at: OffsetDateTime,
    ) -> Result<Vec<StoredReading>, EngineError> {
        let Some(decoded) = decode(service_data) else {
            debug!("Ignoring undecodable advertisement");
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        {
            let store = self.context.store.lock().await;
            for reading in decoded.into_readings(captured_at) {
                records.push(store.append(&reading)?);
            }
        }
        self.optimistic_push().await;
        Ok(records)
    }

    async fn optimistic_push(&self) {
        if self.context.config.sync.optimistic_push {
            let outcome = self.worker.sync_now().await;
            debug!("Optimistic flush: {:?}", outcome);
        }
    }

    /// Run one flush cycle now.
    pub async fn sync_now(&self) -> FlushOutcome {
        self.worker.sync_now().await
    }

    /// Return records stranded in `syncing` by an interrupted run to `dirty`.
    ///
    /// Call once before [`Engine::start`] in the process that owns the
    /// periodic worker; one-shot commands must not, since a running worker
    /// may hold those claims.
    pub async fn recover_in_flight(&self) -> Result<usize, EngineError> {
        Ok(self.context.recover_in_flight().await?)
    }

    /// Start periodic flushing. Idempotent.
    pub fn start(&self) -> bool {
        self.worker.start()
    }

    /// Cancel future flush ticks.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Stop and wait for the worker task to finish.
    pub async fn dispose(&self) {
        self.worker.dispose().await;
    }

    /// Reconciled series for `vital_type` ending now.
    pub async fn history(&self, vital_type: &str, range: HistoryRange) -> Vec<SeriesPoint> {
        self.reconciler.history(vital_type, range).await
    }

    /// Reconciled series for `vital_type` ending at `now`.
    pub async fn history_at(
        &self,
        vital_type: &str,
        range: HistoryRange,
        now: OffsetDateTime,
    ) -> Vec<SeriesPoint> {
        self.reconciler.history_at(vital_type, range, now).await
    }

    /// Queue and worker diagnostics.
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (counts, vital_types) = {
            let store = self.context.store.lock().await;
            (store.state_counts()?, store.vital_types()?)
        };
        Ok(EngineStatus {
            counts,
            vital_types,
            worker_running: self.worker.is_running(),
            flush: self.worker.stats().await,
        })
    }
}
