//! Data models for stored records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use vitalsync_types::{Reading, SyncState};

/// Immutable snapshot of one stored record.
///
/// State changes go through [`Store::transition_state`](crate::Store::transition_state)
/// or [`Store::update_state`](crate::Store::update_state), which return a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Database row ID, used as the record reference.
    pub id: i64,
    /// Measured quantity.
    pub vital_type: String,
    /// When the measurement was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Measured value.
    pub value: f64,
    /// Unit of `value`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Delivery state. Missing in legacy exports, which are treated as synced.
    #[serde(default = "SyncState::legacy")]
    pub sync_state: SyncState,
}

impl StoredReading {
    /// The measurement without storage metadata.
    pub fn to_reading(&self) -> Reading {
        Reading {
            vital_type: self.vital_type.clone(),
            timestamp: self.timestamp,
            value: self.value,
            unit: self.unit.clone(),
        }
    }

    /// Whether the next flush cycle will try to deliver this record.
    pub fn is_pending(&self) -> bool {
        self.sync_state.is_pending()
    }
}

/// Record counts per delivery state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// Awaiting delivery.
    pub dirty: u64,
    /// Claimed by a flush cycle.
    pub syncing: u64,
    /// Delivered.
    pub synced: u64,
}

impl StateCounts {
    /// Total number of records.
    pub fn total(&self) -> u64 {
        self.dirty + self.syncing + self.synced
    }
}

/// Result of an import operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Rows read from the input.
    pub total: usize,
    /// Rows inserted.
    pub imported: usize,
    /// Rows removed again by the retention cap.
    pub evicted: usize,
}
