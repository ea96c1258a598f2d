//! Reconciliation of remote history with local records.
//!
//! A chart asks for one vital type over a [`HistoryRange`]. The series is
//! built from three snapshots taken independently of any flush cycle:
//!
//! 1. remote history in `[cutoff, now]` (best effort, empty on failure)
//! 2. local records of the type since the cutoff, any state
//! 3. local `dirty` records of the type since the cutoff
//!
//! The remote set is kept whole. Each local point is added unless a point
//! already in the series is the same observation (within 2 s and 0.001).

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use vitalsync_core::RemoteObservation;
use vitalsync_store::{RecordQuery, StoredReading};
use vitalsync_types::{DEDUP_TIME_TOLERANCE, HistoryRange, PointSource, SeriesPoint, SyncState};

use crate::context::EngineContext;

/// Builds chart-ready series on demand.
#[derive(Debug, Clone)]
pub struct Reconciler {
    context: Arc<EngineContext>,
}

impl Reconciler {
    /// Create a reconciler over a shared context.
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    /// Reconciled series for `vital_type` ending now.
    pub async fn history(&self, vital_type: &str, range: HistoryRange) -> Vec<SeriesPoint> {
        self.history_at(vital_type, range, OffsetDateTime::now_utc())
            .await
    }

    /// Reconciled series for `vital_type` ending at `now`.
    pub async fn history_at(
        &self,
        vital_type: &str,
        range: HistoryRange,
        now: OffsetDateTime,
    ) -> Vec<SeriesPoint> {
        let cutoff = range.cutoff(now);

        let remote = match self
            .context
            .history
            .fetch_history(vital_type, cutoff, now)
            .await
        {
            Ok(observations) => observations,
            Err(e) => {
                warn!(
                    "Remote {} history unavailable, using local data only: {}",
                    vital_type, e
                );
                Vec::new()
            }
        };

        let (local, pending) = {
            let store = self.context.store.lock().await;
            let local = store.query(vital_type, Some(cutoff)).unwrap_or_else(|e| {
                warn!("Failed to read local {} records: {}", vital_type, e);
                Vec::new()
            });
            let pending_query = RecordQuery::new()
                .vital_type(vital_type)
                .since(cutoff)
                .state(SyncState::Dirty);
            let pending = store.query_records(&pending_query).unwrap_or_else(|e| {
                warn!("Failed to read pending {} records: {}", vital_type, e);
                Vec::new()
            });
            (local, pending)
        };

        let series = merge(&remote, &local, &pending);
        debug!(
            "Reconciled {} {} point(s): {} remote, {} local, {} pending",
            series.len(),
            vital_type,
            remote.len(),
            local.len(),
            pending.len()
        );
        series
    }
}

fn local_point(record: &StoredReading) -> SeriesPoint {
    let source = if record.sync_state == SyncState::Synced {
        PointSource::Local
    } else {
        PointSource::Pending
    };
    SeriesPoint::new(record.timestamp, record.value, source)
}

/// Merge remote, local and pending points into one ascending series.
///
/// Remote points are all kept. A local or pending point is added only if no
/// point already in the series is the same observation.
pub fn merge(
    remote: &[RemoteObservation],
    local: &[StoredReading],
    pending: &[StoredReading],
) -> Vec<SeriesPoint> {
    let mut series: Vec<SeriesPoint> = remote
        .iter()
        .map(|o| SeriesPoint::new(o.timestamp, o.value, PointSource::Remote))
        .collect();
    series.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    for candidate in local.iter().chain(pending).map(local_point) {
        insert_unless_duplicate(&mut series, candidate);
    }

    series
}

/// Insert `candidate` in timestamp order unless the series already has it.
fn insert_unless_duplicate(series: &mut Vec<SeriesPoint>, candidate: SeriesPoint) {
    let window_start = candidate.timestamp - DEDUP_TIME_TOLERANCE;
    let window_end = candidate.timestamp + DEDUP_TIME_TOLERANCE;

    let lo = series.partition_point(|p| p.timestamp <= window_start);
    let hi = series.partition_point(|p| p.timestamp < window_end);
    if series[lo..hi]
        .iter()
        .any(|p| p.is_same_observation(&candidate))
    {
        return;
    }

    let at = series.partition_point(|p| p.timestamp <= candidate.timestamp);
    series.insert(at, candidate);
}
