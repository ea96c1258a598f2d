//! Flattening of remote history responses.
//!
//! The remote history endpoint has been observed returning several shapes:
//! bare arrays, wrapped arrays, clinical bundles, and points that carry their
//! value as a plain number, a quantity object, or a telemetry `data` map.
//! Rather than probing fields ad hoc, a response is passed through two
//! ordered rule lists:
//!
//! 1. [`ENVELOPE_RULES`] locate the list of candidate points.
//! 2. [`POINT_RULES`] turn each candidate into a [`RemoteObservation`]; the
//!    first rule that matches wins.
//!
//! Candidates that match no rule (non-numeric values, composite observations
//! with `component` parts) are discarded for charting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::error::{Error, Result};

/// One remote history point in its minimal, chartable form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemoteObservation {
    /// Observation time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Numeric value.
    pub value: f64,
}

impl RemoteObservation {
    /// Create an observation.
    pub fn new(timestamp: OffsetDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Locates the candidate point list inside a response body.
pub type EnvelopeRule = fn(&Value) -> Option<Vec<&Value>>;

/// Extracts one observation from a candidate point, given the export key.
pub type PointRule = fn(&Value, &str) -> Option<RemoteObservation>;

/// Envelope rules, in priority order.
pub const ENVELOPE_RULES: &[(&str, EnvelopeRule)] = &[
    ("array", envelope_array),
    ("observations", envelope_observations),
    ("data", envelope_data),
    ("bundle", envelope_bundle),
];

/// Point rules, in priority order.
pub const POINT_RULES: &[(&str, PointRule)] = &[
    ("timestamp_value", point_timestamp_value),
    ("quantity", point_quantity),
    ("telemetry_data", point_telemetry_data),
];

/// Flatten a history response into observations sorted by timestamp.
///
/// `key` is the normalized export key of the requested vital type; it is
/// used by rules that look values up by name.
///
/// ```
/// use serde_json::json;
/// use vitalsync_core::observation::flatten_observations;
///
/// let body = json!({ "observations": [
///     { "timestamp": "2024-03-08T12:00:00Z", "value": 36.6 },
///     { "effectiveDateTime": "2024-03-08T11:00:00Z", "valueQuantity": { "value": 36.4 } },
/// ]});
/// let points = flatten_observations(&body, "temperature").unwrap();
/// assert_eq!(points.len(), 2);
/// assert_eq!(points[0].value, 36.4);
/// ```
pub fn flatten_observations(body: &Value, key: &str) -> Result<Vec<RemoteObservation>> {
    let (envelope, candidates) = ENVELOPE_RULES
        .iter()
        .find_map(|(name, rule)| rule(body).map(|items| (*name, items)))
        .ok_or_else(|| {
            Error::InvalidResponse("history response is not a recognized envelope".to_string())
        })?;

    let total = candidates.len();
    let mut observations: Vec<RemoteObservation> = candidates
        .into_iter()
        .filter_map(|candidate| flatten_point(candidate, key))
        .collect();
    observations.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    if observations.len() < total {
        debug!(
            "Discarded {} of {} remote points ({} envelope)",
            total - observations.len(),
            total,
            envelope
        );
    }

    Ok(observations)
}

/// Apply the point rules to one candidate.
pub fn flatten_point(candidate: &Value, key: &str) -> Option<RemoteObservation> {
    if is_composite(candidate) {
        return None;
    }
    POINT_RULES.iter().find_map(|(_, rule)| rule(candidate, key))
}

fn is_composite(candidate: &Value) -> bool {
    candidate
        .get("component")
        .and_then(Value::as_array)
        .is_some_and(|parts| !parts.is_empty())
}

/// Parse an RFC 3339 string or epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        _ => None,
    }
}

// --- Envelope rules ---

/// `[ point, ... ]`
pub fn envelope_array(body: &Value) -> Option<Vec<&Value>> {
    body.as_array().map(|items| items.iter().collect())
}

/// `{ "observations": [ point, ... ] }`
pub fn envelope_observations(body: &Value) -> Option<Vec<&Value>> {
    body.get("observations")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
}

/// `{ "data": [ point, ... ] }`
pub fn envelope_data(body: &Value) -> Option<Vec<&Value>> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
}

/// `{ "entry": [ { "resource": point }, ... ] }`
pub fn envelope_bundle(body: &Value) -> Option<Vec<&Value>> {
    body.get("entry").and_then(Value::as_array).map(|entries| {
        entries
            .iter()
            .map(|entry| entry.get("resource").unwrap_or(entry))
            .collect()
    })
}

// --- Point rules ---

/// `{ "timestamp": ..., "value": <number> }`
pub fn point_timestamp_value(candidate: &Value, _key: &str) -> Option<RemoteObservation> {
    let timestamp = parse_timestamp(candidate.get("timestamp")?)?;
    let value = candidate.get("value")?.as_f64()?;
    Some(RemoteObservation::new(timestamp, value))
}

/// `{ "effectiveDateTime": ..., "valueQuantity": { "value": <number> } }`
pub fn point_quantity(candidate: &Value, _key: &str) -> Option<RemoteObservation> {
    let time = candidate
        .get("effectiveDateTime")
        .or_else(|| candidate.get("effectiveInstant"))?;
    let timestamp = parse_timestamp(time)?;
    let value = candidate.get("valueQuantity")?.get("value")?.as_f64()?;
    Some(RemoteObservation::new(timestamp, value))
}

/// `{ "timestamp": ..., "data": { "<key>": <number> } }`
pub fn point_telemetry_data(candidate: &Value, key: &str) -> Option<RemoteObservation> {
    let timestamp = parse_timestamp(candidate.get("timestamp")?)?;
    let value = candidate.get("data")?.get(key)?.as_f64()?;
    Some(RemoteObservation::new(timestamp, value))
}
