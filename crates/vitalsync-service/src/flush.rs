//! Background flush worker.
//!
//! Drains `dirty` records through the push collaborator, oldest first. A
//! cycle halts at the first failed push so delivery order is preserved; the
//! failed record and everything after it wait for the next cycle.
//!
//! Per record: `dirty -> syncing`, push, then `syncing -> synced` on success
//! or `syncing -> dirty` on failure. Every step is a compare-and-set on the
//! stored state, so a record claimed by another engine over the same
//! database is skipped rather than pushed twice.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vitalsync_types::{SyncState, TelemetryPayload};

use crate::context::EngineContext;

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FlushOutcome {
    /// Another cycle was running; nothing was attempted.
    Skipped,
    /// No usable credentials; no record changed state.
    NoCredentials,
    /// The store could not be read; no record changed state.
    StoreUnavailable,
    /// The cycle ran.
    Completed {
        /// Records transitioned to `synced`.
        synced: usize,
        /// Record at which the cycle stopped, if it did not drain the queue.
        halted_at: Option<i64>,
    },
}

impl FlushOutcome {
    /// Number of records transitioned to `synced`.
    pub fn synced(&self) -> usize {
        match self {
            FlushOutcome::Completed { synced, .. } => *synced,
            _ => 0,
        }
    }

    /// Whether the cycle stopped before draining the queue.
    pub fn is_halted(&self) -> bool {
        matches!(
            self,
            FlushOutcome::Completed {
                halted_at: Some(_),
                ..
            }
        )
    }
}

/// Worker counters for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushStats {
    /// Cycles that ran (not skipped).
    pub cycles: u64,
    /// Cycles skipped by the single-flight guard.
    pub skipped: u64,
    /// Records delivered.
    pub pushed: u64,
    /// Cycles that halted or aborted.
    pub failures: u64,
    /// When the last cycle finished.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_cycle: Option<OffsetDateTime>,
    /// Outcome of the last cycle.
    pub last_outcome: Option<FlushOutcome>,
}

impl FlushStats {
    fn record(&mut self, outcome: FlushOutcome) {
        if outcome == FlushOutcome::Skipped {
            self.skipped += 1;
            return;
        }

        self.cycles += 1;
        self.pushed += outcome.synced() as u64;
        if !matches!(
            outcome,
            FlushOutcome::Completed {
                halted_at: None,
                ..
            }
        ) {
            self.failures += 1;
        }
        self.last_cycle = Some(OffsetDateTime::now_utc());
        self.last_outcome = Some(outcome);
    }
}

struct WorkerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic and on-demand queue drainer.
pub struct FlushWorker {
    context: Arc<EngineContext>,
    interval: Duration,
    cycle_lock: Mutex<()>,
    stats: RwLock<FlushStats>,
    task: StdMutex<Option<WorkerTask>>,
    /// Claimed records whose release write failed, with the state still owed.
    unsettled: StdMutex<Vec<(i64, SyncState)>>,
}

impl std::fmt::Debug for FlushWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushWorker")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FlushWorker {
    /// Create a worker ticking at the configured flush interval.
    pub fn new(context: Arc<EngineContext>) -> Arc<Self> {
        let interval = context.config.sync.interval();
        Self::with_interval(context, interval)
    }

    /// Create a worker with an explicit interval (at least one second).
    pub fn with_interval(context: Arc<EngineContext>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            context,
            interval: interval.max(Duration::from_secs(1)),
            cycle_lock: Mutex::new(()),
            stats: RwLock::new(FlushStats::default()),
            task: StdMutex::new(None),
            unsettled: StdMutex::new(Vec::new()),
        })
    }

    /// Start periodic flushing: one immediate cycle, then one per interval.
    ///
    /// Returns `false` if the worker is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task
            .as_ref()
            .is_some_and(|t| !t.cancel.is_cancelled() && !t.handle.is_finished())
        {
            debug!("Flush worker already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let worker = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { worker.run(token).await });

        // A previous, stopped task keeps finishing its cycle on its own
        *task = Some(WorkerTask { cancel, handle });
        true
    }

    /// Cancel future ticks. A cycle already in progress runs to completion.
    pub fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.as_ref() {
            task.cancel.cancel();
        }
    }

    /// Stop and wait for the worker task to finish.
    pub async fn dispose(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!("Flush worker task ended abnormally: {}", e);
            }
        }
    }

    /// Whether periodic flushing is active.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.cancel.is_cancelled() && !t.handle.is_finished())
    }

    /// Snapshot of the worker counters.
    pub async fn stats(&self) -> FlushStats {
        self.stats.read().await.clone()
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Starting flush worker (interval: {}s)",
            self.interval.as_secs()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Flush worker stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // Outside the select so cancellation never interrupts a cycle
            let outcome = self.sync_now().await;
            debug!("Periodic flush finished: {:?}", outcome);
        }
    }

    /// Run one flush cycle now, unless one is already running.
    pub async fn sync_now(&self) -> FlushOutcome {
        let outcome = match self.cycle_lock.try_lock() {
            Ok(_guard) => self.cycle().await,
            Err(_) => {
                debug!("Flush cycle already in progress, skipping");
                FlushOutcome::Skipped
            }
        };

        self.stats.write().await.record(outcome);
        outcome
    }

    async fn cycle(&self) -> FlushOutcome {
        // Claims this worker could not release last time come first
        if !self.settle_unsettled().await {
            return FlushOutcome::StoreUnavailable;
        }

        let credentials = match self.context.credentials.resolve().await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Skipping flush: {}", e);
                return FlushOutcome::NoCredentials;
            }
        };

        let records = match self.context.store.lock().await.query_dirty() {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping flush, store unavailable: {}", e);
                return FlushOutcome::StoreUnavailable;
            }
        };

        if records.is_empty() {
            return FlushOutcome::Completed {
                synced: 0,
                halted_at: None,
            };
        }

        debug!("Flushing {} dirty record(s)", records.len());
        let mut synced = 0;

        for record in records {
            match self
                .transition(record.id, SyncState::Dirty, SyncState::Syncing)
                .await
            {
                Transition::Done => {}
                Transition::Vanished | Transition::Lost => continue,
                Transition::Failed => {
                    return FlushOutcome::Completed {
                        synced,
                        halted_at: Some(record.id),
                    };
                }
            }

            let payload = TelemetryPayload::from_reading(&record.to_reading(), &credentials);
            let next = match self.context.sink.push(&payload).await {
                Ok(()) => SyncState::Synced,
                Err(e) => {
                    warn!(
                        "Push failed for {} record {}: {}",
                        record.vital_type, record.id, e
                    );
                    SyncState::Dirty
                }
            };

            match self.transition(record.id, SyncState::Syncing, next).await {
                Transition::Done if next == SyncState::Synced => synced += 1,
                Transition::Done | Transition::Vanished | Transition::Lost => {}
                Transition::Failed => {
                    error!(
                        "Record {} is still syncing; retrying the {} write before the next cycle",
                        record.id, next
                    );
                    self.unsettled_claims().push((record.id, next));
                    return FlushOutcome::Completed {
                        synced,
                        halted_at: Some(record.id),
                    };
                }
            }

            if next == SyncState::Dirty {
                return FlushOutcome::Completed {
                    synced,
                    halted_at: Some(record.id),
                };
            }
        }

        info!("Flushed {} record(s)", synced);
        FlushOutcome::Completed {
            synced,
            halted_at: None,
        }
    }

    /// Retry state writes that failed after this worker claimed a record.
    ///
    /// Returns `false` if any write still fails; delivering newer records
    /// first would break chronological order.
    async fn settle_unsettled(&self) -> bool {
        let pending = std::mem::take(&mut *self.unsettled_claims());
        if pending.is_empty() {
            return true;
        }

        let mut remaining = Vec::new();
        for (id, next) in pending {
            if self.transition(id, SyncState::Syncing, next).await == Transition::Failed {
                remaining.push((id, next));
            } else {
                debug!("Settled record {} as {}", id, next);
            }
        }

        if remaining.is_empty() {
            return true;
        }
        warn!(
            "Skipping flush, {} claimed record(s) could not be released",
            remaining.len()
        );
        self.unsettled_claims().extend(remaining);
        false
    }

    fn unsettled_claims(&self) -> MutexGuard<'_, Vec<(i64, SyncState)>> {
        self.unsettled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn transition(&self, id: i64, from: SyncState, next: SyncState) -> Transition {
        let store = self.context.store.lock().await;
        match store.transition_state(id, from, next) {
            Ok(Some(_)) => Transition::Done,
            Ok(None) => {
                debug!("Record {} is no longer {}, skipping", id, from);
                Transition::Lost
            }
            Err(vitalsync_store::Error::RecordNotFound(id)) => {
                debug!("Record {} was evicted during flush, skipping", id);
                Transition::Vanished
            }
            Err(e) => {
                warn!("Failed to mark record {} {}: {}", id, next, e);
                Transition::Failed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// The write took effect.
    Done,
    /// The record was evicted.
    Vanished,
    /// The record is in another state; the claim belongs to someone else.
    Lost,
    /// The write failed.
    Failed,
}
