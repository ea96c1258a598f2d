//! Shared types for the VitalSync wearable telemetry engine.
//!
//! This crate provides the value types passed between the decoder
//! (vitalsync-core), the record store (vitalsync-store) and the sync
//! service (vitalsync-service).
//!
//! # Features
//!
//! - Accepted measurements and their delivery state
//! - Outbound payloads with export-key normalization
//! - Chart-ready series points with fuzzy identity
//! - Broadcast service tags for supported sensors
//!
//! # Example
//!
//! ```
//! use time::OffsetDateTime;
//! use vitalsync_types::{Reading, SyncState};
//!
//! let reading = Reading::new("temperature", 36.6, OffsetDateTime::now_utc()).with_unit("°C");
//! assert_eq!(reading.unit.as_deref(), Some("°C"));
//! assert_eq!(SyncState::default(), SyncState::Dirty);
//! ```

pub mod error;
pub mod payload;
pub mod tags;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use payload::{Credentials, TelemetryPayload, normalize_export_key};
pub use types::{
    DEDUP_TIME_TOLERANCE, DEDUP_VALUE_TOLERANCE, HUMIDITY, HistoryRange, PointSource, Reading,
    SeriesPoint, SyncState, TEMPERATURE,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration, OffsetDateTime, UtcOffset};

    // --- SyncState tests ---

    #[test]
    fn test_sync_state_default_is_dirty() {
        assert_eq!(SyncState::default(), SyncState::Dirty);
    }

    #[test]
    fn test_sync_state_legacy_is_synced() {
        assert_eq!(SyncState::legacy(), SyncState::Synced);
        assert!(!SyncState::legacy().is_pending());
    }

    #[test]
    fn test_sync_state_transitions() {
        assert!(SyncState::Dirty.can_transition_to(SyncState::Syncing));
        assert!(SyncState::Syncing.can_transition_to(SyncState::Synced));
        assert!(SyncState::Syncing.can_transition_to(SyncState::Dirty));

        assert!(!SyncState::Dirty.can_transition_to(SyncState::Synced));
        assert!(!SyncState::Synced.can_transition_to(SyncState::Syncing));
        assert!(!SyncState::Synced.can_transition_to(SyncState::Dirty));
    }

    #[test]
    fn test_sync_state_from_str() {
        assert_eq!("dirty".parse::<SyncState>(), Ok(SyncState::Dirty));
        assert_eq!(" Syncing ".parse::<SyncState>(), Ok(SyncState::Syncing));
        assert_eq!("SYNCED".parse::<SyncState>(), Ok(SyncState::Synced));

        let err = "pending".parse::<SyncState>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown sync state: pending");
    }

    #[test]
    fn test_sync_state_display_matches_as_str() {
        for state in [SyncState::Dirty, SyncState::Syncing, SyncState::Synced] {
            assert_eq!(state.to_string(), state.as_str());
        }
    }

    #[test]
    fn test_sync_state_serialization() {
        assert_eq!(serde_json::to_string(&SyncState::Dirty).unwrap(), "\"dirty\"");
        assert_eq!(
            serde_json::from_str::<SyncState>("\"synced\"").unwrap(),
            SyncState::Synced
        );
    }

    // --- HistoryRange tests ---

    #[test]
    fn test_history_range_parse() {
        assert_eq!("24h".parse::<HistoryRange>(), Ok(HistoryRange::Day));
        assert_eq!("7d".parse::<HistoryRange>(), Ok(HistoryRange::Week));
        assert_eq!("30D".parse::<HistoryRange>(), Ok(HistoryRange::Month));
        assert!("1y".parse::<HistoryRange>().is_err());
    }

    #[test]
    fn test_history_range_cutoff() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(100);
        assert_eq!(HistoryRange::Day.cutoff(now), now - Duration::hours(24));
        assert_eq!(HistoryRange::Month.cutoff(now), now - Duration::days(30));
    }

    #[test]
    fn test_history_range_display_roundtrip() {
        for range in [HistoryRange::Day, HistoryRange::Week, HistoryRange::Month] {
            assert_eq!(range.to_string().parse::<HistoryRange>(), Ok(range));
        }
    }

    // --- SeriesPoint tests ---

    #[test]
    fn test_same_observation_within_tolerance() {
        let t = OffsetDateTime::UNIX_EPOCH + Duration::seconds(100);
        let remote = SeriesPoint::new(t, 36.6, PointSource::Remote);
        let local = SeriesPoint::new(t + Duration::seconds(1), 36.6005, PointSource::Local);
        assert!(remote.is_same_observation(&local));
        assert!(local.is_same_observation(&remote));
    }

    #[test]
    fn test_same_observation_time_boundary_is_exclusive() {
        let t = OffsetDateTime::UNIX_EPOCH;
        let a = SeriesPoint::new(t, 1.0, PointSource::Remote);
        let b = SeriesPoint::new(t + Duration::seconds(2), 1.0, PointSource::Local);
        assert!(!a.is_same_observation(&b));

        let c = SeriesPoint::new(t + Duration::milliseconds(1999), 1.0, PointSource::Local);
        assert!(a.is_same_observation(&c));
    }

    #[test]
    fn test_same_observation_value_boundary() {
        let t = OffsetDateTime::UNIX_EPOCH;
        let a = SeriesPoint::new(t, 36.6, PointSource::Remote);
        let b = SeriesPoint::new(t, 36.602, PointSource::Local);
        assert!(!a.is_same_observation(&b));
    }

    // --- Payload tests ---

    #[test]
    fn test_credentials_usable() {
        assert!(Credentials::new("dev-1", None).is_usable());
        assert!(!Credentials::default().is_usable());
        assert!(!Credentials::new("   ", Some("t".into())).is_usable());
    }

    #[test]
    fn test_credentials_deserialize_camel_case() {
        let creds: Credentials =
            serde_json::from_str(r#"{"deviceId":"dev-9","tenantId":"ward-7"}"#).unwrap();
        assert_eq!(creds.device_id.as_deref(), Some("dev-9"));
        assert_eq!(creds.tenant_id.as_deref(), Some("ward-7"));

        let partial: Credentials = serde_json::from_str(r#"{"tenantId":"ward-7"}"#).unwrap();
        assert!(!partial.is_usable());
    }

    #[test]
    fn test_payload_normalizes_key_and_converts_to_utc() {
        let offset = UtcOffset::from_hms(2, 0, 0).unwrap();
        let local_time = (OffsetDateTime::UNIX_EPOCH + Duration::hours(5)).to_offset(offset);
        let reading = Reading::new("temp", 37.0, local_time);

        let payload =
            TelemetryPayload::from_reading(&reading, &Credentials::new("dev-1", Some("t-1".into())));

        assert_eq!(payload.timestamp.offset(), UtcOffset::UTC);
        assert_eq!(payload.timestamp, reading.timestamp);
        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data.get("temperature"), Some(&37.0));
    }

    #[test]
    fn test_payload_serialization_shape() {
        let reading = Reading::new("humidity", 55.0, OffsetDateTime::UNIX_EPOCH);
        let payload = TelemetryPayload::from_reading(&reading, &Credentials::new("dev-1", None));

        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert!(json.get("tenantId").is_none());
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
        assert_eq!(json["data"]["humidity"], 55.0);
    }

    #[test]
    fn test_normalize_export_key() {
        assert_eq!(normalize_export_key("temp"), "temperature");
        assert_eq!(normalize_export_key("body_temp"), "temperature");
        assert_eq!(normalize_export_key("  Body Temperature "), "temperature");
        assert_eq!(normalize_export_key("RH"), "humidity");
        assert_eq!(normalize_export_key("pulse"), "heart_rate");
        assert_eq!(normalize_export_key("SpO2"), "spo2");
    }

    #[test]
    fn test_normalize_export_key_passthrough_is_unchanged() {
        assert_eq!(normalize_export_key("Glucose_mg"), "Glucose_mg");
        assert_eq!(normalize_export_key(""), "");
    }

    // --- Reading tests ---

    #[test]
    fn test_reading_deserialize_without_unit() {
        let json = r#"{"vital_type":"temperature","timestamp":"2024-03-08T12:00:00Z","value":36.6}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.vital_type, TEMPERATURE);
        assert!(reading.unit.is_none());
    }
}
