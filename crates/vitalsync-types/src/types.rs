//! Core types for vital-sign telemetry.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::ParseError;

/// Vital type used for decoded temperature readings.
pub const TEMPERATURE: &str = "temperature";

/// Vital type used for decoded relative humidity readings.
pub const HUMIDITY: &str = "humidity";

/// Two points closer than this in time may be the same observation.
pub const DEDUP_TIME_TOLERANCE: Duration = Duration::seconds(2);

/// Two points closer than this in value may be the same observation.
pub const DEDUP_VALUE_TOLERANCE: f64 = 0.001;

/// Delivery state of a stored reading.
///
/// The lifecycle is `Dirty -> Syncing -> Synced`, with `Syncing -> Dirty`
/// whenever a push attempt fails.
///
/// ```
/// use vitalsync_types::SyncState;
///
/// assert!(SyncState::Dirty.can_transition_to(SyncState::Syncing));
/// assert!(SyncState::Syncing.can_transition_to(SyncState::Dirty));
/// assert!(!SyncState::Synced.can_transition_to(SyncState::Dirty));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SyncState {
    /// Accepted locally, not yet confirmed by the remote system.
    #[default]
    Dirty,
    /// Claimed by an in-flight push attempt.
    Syncing,
    /// Confirmed by the remote system.
    Synced,
}

impl SyncState {
    /// State assumed for records written before delivery tracking existed.
    ///
    /// Such records predate end-to-end delivery and are never retried.
    pub const LEGACY: SyncState = SyncState::Synced;

    /// Canonical lowercase name, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Dirty => "dirty",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
        }
    }

    /// Whether a flush worker may move a record from `self` to `next`.
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Dirty, SyncState::Syncing)
                | (SyncState::Syncing, SyncState::Synced)
                | (SyncState::Syncing, SyncState::Dirty)
        )
    }

    /// Whether the record is eligible for the next flush cycle.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Dirty)
    }

    /// Serde default for fields missing from legacy data.
    pub fn legacy() -> Self {
        Self::LEGACY
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dirty" => Ok(SyncState::Dirty),
            "syncing" => Ok(SyncState::Syncing),
            "synced" => Ok(SyncState::Synced),
            _ => Err(ParseError::UnknownSyncState(s.to_string())),
        }
    }
}

/// A single accepted measurement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Measured quantity, e.g. `temperature`. Free-form.
    pub vital_type: String,
    /// When the measurement was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Measured value.
    pub value: f64,
    /// Unit of `value`, if known.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub unit: Option<String>,
}

impl Reading {
    /// Create a reading without a unit.
    pub fn new(vital_type: impl Into<String>, value: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            vital_type: vital_type.into(),
            timestamp,
            value,
            unit: None,
        }
    }

    /// Attach a unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Lookback window for a reconciled history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HistoryRange {
    /// The last 24 hours.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "24h"))]
    Day,
    /// The last 7 days.
    #[cfg_attr(feature = "serde", serde(rename = "7d"))]
    Week,
    /// The last 30 days.
    #[cfg_attr(feature = "serde", serde(rename = "30d"))]
    Month,
}

impl HistoryRange {
    /// Length of the window.
    pub fn lookback(&self) -> Duration {
        match self {
            HistoryRange::Day => Duration::hours(24),
            HistoryRange::Week => Duration::days(7),
            HistoryRange::Month => Duration::days(30),
        }
    }

    /// Earliest timestamp included when the window ends at `now`.
    ///
    /// ```
    /// use time::macros::datetime;
    /// use vitalsync_types::HistoryRange;
    ///
    /// let now = datetime!(2024-03-08 12:00 UTC);
    /// assert_eq!(HistoryRange::Week.cutoff(now), datetime!(2024-03-01 12:00 UTC));
    /// ```
    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.lookback()
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryRange::Day => write!(f, "24h"),
            HistoryRange::Week => write!(f, "7d"),
            HistoryRange::Month => write!(f, "30d"),
        }
    }
}

impl FromStr for HistoryRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "24h" | "1d" | "day" => Ok(HistoryRange::Day),
            "7d" | "1w" | "week" => Ok(HistoryRange::Week),
            "30d" | "month" => Ok(HistoryRange::Month),
            _ => Err(ParseError::UnknownRange(s.to_string())),
        }
    }
}

/// Where a point in a reconciled series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PointSource {
    /// Authoritative remote history.
    Remote,
    /// Local store, any delivery state.
    Local,
    /// Local store, not yet confirmed by the remote system.
    Pending,
}

/// One chart-ready point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeriesPoint {
    /// Observation time.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Observed value.
    pub value: f64,
    /// Origin of the point.
    pub source: PointSource,
}

impl SeriesPoint {
    /// Create a point.
    pub fn new(timestamp: OffsetDateTime, value: f64, source: PointSource) -> Self {
        Self {
            timestamp,
            value,
            source,
        }
    }

    /// Fuzzy identity: same observation if both time and value are within tolerance.
    ///
    /// ```
    /// use time::{Duration, OffsetDateTime};
    /// use vitalsync_types::{PointSource, SeriesPoint};
    ///
    /// let t = OffsetDateTime::UNIX_EPOCH;
    /// let a = SeriesPoint::new(t, 36.6, PointSource::Remote);
    /// let b = SeriesPoint::new(t + Duration::seconds(1), 36.6005, PointSource::Local);
    /// assert!(a.is_same_observation(&b));
    /// ```
    pub fn is_same_observation(&self, other: &SeriesPoint) -> bool {
        (self.timestamp - other.timestamp).abs() < DEDUP_TIME_TOLERANCE
            && (self.value - other.value).abs() < DEDUP_VALUE_TOLERANCE
    }
}
