//! Outbound telemetry payloads and delivery credentials.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::types::Reading;

/// Identity attached to outbound telemetry.
///
/// Resolved at flush time and never persisted with readings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Credentials {
    /// Device identity registered with the remote system.
    #[cfg_attr(feature = "serde", serde(default))]
    pub device_id: Option<String>,
    /// Tenant (organization) the device belongs to.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tenant_id: Option<String>,
}

impl Credentials {
    /// Create credentials for a device.
    pub fn new(device_id: impl Into<String>, tenant_id: Option<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            tenant_id,
        }
    }

    /// A flush can only proceed with a non-empty device identity.
    pub fn is_usable(&self) -> bool {
        self.device_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}

/// Body of a single remote push.
///
/// Serialized as:
///
/// ```json
/// { "deviceId": "dev-1", "tenantId": "t-1",
///   "timestamp": "2024-03-08T12:00:00Z", "data": { "temperature": 36.6 } }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TelemetryPayload {
    /// Device identity.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub device_id: Option<String>,
    /// Tenant identity.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub tenant_id: Option<String>,
    /// Observation time in UTC.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Normalized key to value.
    pub data: BTreeMap<String, f64>,
}

impl TelemetryPayload {
    /// Build the payload for one reading.
    ///
    /// ```
    /// use time::OffsetDateTime;
    /// use vitalsync_types::{Credentials, Reading, TelemetryPayload};
    ///
    /// let reading = Reading::new("body_temp", 36.6, OffsetDateTime::UNIX_EPOCH);
    /// let payload = TelemetryPayload::from_reading(&reading, &Credentials::new("dev-1", None));
    /// assert_eq!(payload.data.get("temperature"), Some(&36.6));
    /// ```
    pub fn from_reading(reading: &Reading, credentials: &Credentials) -> Self {
        let mut data = BTreeMap::new();
        data.insert(normalize_export_key(&reading.vital_type), reading.value);
        Self {
            device_id: credentials.device_id.clone(),
            tenant_id: credentials.tenant_id.clone(),
            timestamp: reading.timestamp.to_offset(UtcOffset::UTC),
            data,
        }
    }
}

/// Loose local names and the canonical export name they map to.
const EXPORT_ALIASES: &[(&str, &str)] = &[
    ("temp", "temperature"),
    ("temperature", "temperature"),
    ("body_temp", "temperature"),
    ("body_temperature", "temperature"),
    ("skin_temp", "temperature"),
    ("temperature_c", "temperature"),
    ("hum", "humidity"),
    ("humidity", "humidity"),
    ("rh", "humidity"),
    ("relative_humidity", "humidity"),
    ("hr", "heart_rate"),
    ("pulse", "heart_rate"),
    ("heart_rate", "heart_rate"),
    ("heartrate", "heart_rate"),
    ("bpm", "heart_rate"),
    ("spo2", "spo2"),
    ("oxygen_saturation", "spo2"),
    ("o2_sat", "spo2"),
    ("rr", "respiratory_rate"),
    ("resp_rate", "respiratory_rate"),
    ("respiratory_rate", "respiratory_rate"),
];

/// Map a local vital type to its canonical export key.
///
/// Matching ignores case, surrounding whitespace, and treats `-` and spaces
/// like `_`. Unrecognized keys pass through unchanged.
///
/// ```
/// use vitalsync_types::normalize_export_key;
///
/// assert_eq!(normalize_export_key("temp"), "temperature");
/// assert_eq!(normalize_export_key("Body-Temp"), "temperature");
/// assert_eq!(normalize_export_key("glucose"), "glucose");
/// ```
pub fn normalize_export_key(vital_type: &str) -> String {
    let folded: String = vital_type
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();

    EXPORT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| vital_type.to_string())
}
