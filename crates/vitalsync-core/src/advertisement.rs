//! Broadcast payload decoding for passive sensor capture.
//!
//! Wearable temperature/humidity sensors publish their measurements in the
//! service data of their advertisements. This module turns a captured
//! `identifier -> bytes` map into typed readings without holding a connection.
//!
//! Two vendor layouts are understood, tried in priority order:
//!
//! | Layout | Tag | Min bytes | Temperature | Humidity |
//! |--------|-----|-----------|-------------|----------|
//! | A | `181a` | 9 | `i16` BE at 6-7, ÷10 | `u8` at 8, `0..=100` |
//! | B | `fe95` | 7 (byte 0 = `0x50`) | `i16` LE at 4-5, ÷100 | `u8` at 6 |
//!
//! Decoding never fails loudly: anything malformed yields `None`.

use std::collections::HashMap;

use bytes::Buf;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use vitalsync_types::tags::{
    FORMAT_A_TAG, FORMAT_B_FRAME_TYPE, FORMAT_B_TAG, SENSOR_NAME_HINTS, identifier_has_tag,
};
use vitalsync_types::{HUMIDITY, Reading, TEMPERATURE};

/// Minimum payload length of a Format A frame.
pub const MIN_FORMAT_A_BYTES: usize = 9;

/// Minimum payload length of a Format B frame.
pub const MIN_FORMAT_B_BYTES: usize = 7;

/// Vendor layout a value was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    /// Custom-firmware environmental layout.
    A,
    /// Vendor beacon layout.
    B,
}

/// Measurements decoded from one advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedReading {
    /// Temperature in degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity percentage.
    pub humidity: Option<f64>,
    /// Layout the temperature came from.
    pub temperature_source: Option<PayloadFormat>,
    /// Layout the humidity came from.
    pub humidity_source: Option<PayloadFormat>,
}

impl DecodedReading {
    /// Split into one accepted reading per present quantity.
    pub fn into_readings(self, captured_at: OffsetDateTime) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(2);
        if let Some(temperature) = self.temperature {
            readings.push(Reading::new(TEMPERATURE, temperature, captured_at).with_unit("°C"));
        }
        if let Some(humidity) = self.humidity {
            readings.push(Reading::new(HUMIDITY, humidity, captured_at).with_unit("%"));
        }
        readings
    }
}

/// Values extracted from a single layout.
#[derive(Debug, Default, Clone, Copy)]
struct FrameValues {
    temperature: Option<f64>,
    humidity: Option<f64>,
}

/// Decode captured service data.
///
/// Returns `None` when no supported layout yields any value. When both
/// layouts yield the same quantity, Format A wins.
///
/// ```
/// use std::collections::HashMap;
/// use vitalsync_core::advertisement::decode;
///
/// let mut service_data = HashMap::new();
/// // address (6), temperature 202 (BE), humidity 55
/// service_data.insert("181a".to_string(), vec![0, 0, 0, 0, 0, 0, 0x00, 0xCA, 55]);
///
/// let reading = decode(&service_data).unwrap();
/// assert!((reading.temperature.unwrap() - 20.2).abs() < 1e-9);
/// assert_eq!(reading.humidity, Some(55.0));
/// ```
pub fn decode(service_data: &HashMap<String, Vec<u8>>) -> Option<DecodedReading> {
    let format_a = find_payload(service_data, FORMAT_A_TAG)
        .map(parse_format_a)
        .unwrap_or_default();
    let format_b = find_payload(service_data, FORMAT_B_TAG)
        .map(parse_format_b)
        .unwrap_or_default();

    let (temperature, temperature_source) = prefer(format_a.temperature, format_b.temperature);
    let (humidity, humidity_source) = prefer(format_a.humidity, format_b.humidity);

    if temperature.is_none() && humidity.is_none() {
        return None;
    }

    Some(DecodedReading {
        temperature,
        humidity,
        temperature_source,
        humidity_source,
    })
}

/// Check whether an advertisement comes from a supported sensor.
///
/// Matches on service identifiers first, then on a case-insensitive
/// substring of the advertised device name.
pub fn is_recognized_sensor(service_data: &HashMap<String, Vec<u8>>, name: Option<&str>) -> bool {
    let by_service = service_data.keys().any(|id| {
        identifier_has_tag(id, FORMAT_A_TAG) || identifier_has_tag(id, FORMAT_B_TAG)
    });
    if by_service {
        return true;
    }

    name.map(|n| n.to_lowercase())
        .is_some_and(|n| SENSOR_NAME_HINTS.iter().any(|hint| n.contains(hint)))
}

/// Pick the payload for `tag`.
///
/// When several identifiers carry the tag, the bare 16-bit form wins, then
/// the Bluetooth base UUID form, then the lowest identifier in byte order,
/// so the choice never depends on map iteration order.
fn find_payload<'a>(service_data: &'a HashMap<String, Vec<u8>>, tag: &str) -> Option<&'a [u8]> {
    let base_uuid = format!("0000{}-0000-1000-8000-00805f9b34fb", tag);
    service_data
        .iter()
        .filter(|(id, _)| identifier_has_tag(id, tag))
        .min_by_key(|&(id, _)| {
            let normalized = id.trim().to_ascii_lowercase();
            let rank = if normalized == tag {
                0
            } else if normalized == base_uuid {
                1
            } else {
                2
            };
            (rank, id.as_str())
        })
        .map(|(_, data)| data.as_slice())
}

fn prefer(a: Option<f64>, b: Option<f64>) -> (Option<f64>, Option<PayloadFormat>) {
    match (a, b) {
        (Some(v), _) => (Some(v), Some(PayloadFormat::A)),
        (None, Some(v)) => (Some(v), Some(PayloadFormat::B)),
        (None, None) => (None, None),
    }
}

/// Parse a Format A frame.
///
/// Format (9+ bytes):
/// - bytes 0-5: Originating address (ignored)
/// - bytes 6-7: Temperature (i16 BE, ÷10 for °C)
/// - byte 8: Humidity (u8, valid 0-100)
/// - bytes 9+: battery / counter (ignored)
fn parse_format_a(data: &[u8]) -> FrameValues {
    if data.len() < MIN_FORMAT_A_BYTES {
        debug!(
            "Format A payload requires {} bytes, got {}",
            MIN_FORMAT_A_BYTES,
            data.len()
        );
        return FrameValues::default();
    }

    let mut buf = &data[6..];
    let temp_raw = buf.get_i16();
    let humidity_raw = buf.get_u8();

    FrameValues {
        temperature: Some(f64::from(temp_raw) / 10.0),
        humidity: (humidity_raw <= 100).then_some(f64::from(humidity_raw)),
    }
}

/// Parse a Format B frame.
///
/// Format (7+ bytes):
/// - byte 0: Frame type (must be 0x50)
/// - bytes 1-3: Frame control / counter (ignored)
/// - bytes 4-5: Temperature (i16 LE, ÷100 for °C)
/// - byte 6: Humidity (u8)
fn parse_format_b(data: &[u8]) -> FrameValues {
    if data.len() < MIN_FORMAT_B_BYTES {
        debug!(
            "Format B payload requires {} bytes, got {}",
            MIN_FORMAT_B_BYTES,
            data.len()
        );
        return FrameValues::default();
    }

    if data[0] != FORMAT_B_FRAME_TYPE {
        debug!("Ignoring Format B frame type 0x{:02X}", data[0]);
        return FrameValues::default();
    }

    let mut buf = &data[4..];
    let temp_raw = buf.get_i16_le();
    let humidity_raw = buf.get_u8();

    FrameValues {
        temperature: Some(f64::from(temp_raw) / 100.0),
        humidity: Some(f64::from(humidity_raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(entries: &[(&str, Vec<u8>)]) -> HashMap<String, Vec<u8>> {
        entries
            .iter()
            .map(|(id, data)| (id.to_string(), data.clone()))
            .collect()
    }

    fn format_a(temp_raw: i16, humidity: u8) -> Vec<u8> {
        let mut data = vec![0xA4, 0xC1, 0x38, 0x01, 0x02, 0x03];
        data.extend_from_slice(&temp_raw.to_be_bytes());
        data.push(humidity);
        data
    }

    fn format_b(temp_raw: i16, humidity: u8) -> Vec<u8> {
        let mut data = vec![FORMAT_B_FRAME_TYPE, 0x20, 0xAA, 0x01];
        data.extend_from_slice(&temp_raw.to_le_bytes());
        data.push(humidity);
        data
    }

    #[test]
    fn test_exact_tag_wins_over_longer_identifiers() {
        for _ in 0..16 {
            let data = service(&[
                ("0000181a-0000-1000-8000-00805f9b34fb", format_a(250, 40)),
                ("ffff181aff", format_a(100, 10)),
                ("181A", format_a(202, 55)),
            ]);
            let reading = decode(&data).unwrap();
            assert_eq!(reading.humidity, Some(55.0));
        }
    }

    #[test]
    fn test_base_uuid_wins_over_other_matches() {
        let data = service(&[
            ("ffff181aff", format_a(100, 10)),
            ("0000181A-0000-1000-8000-00805F9B34FB", format_a(250, 40)),
        ]);
        assert_eq!(decode(&data).unwrap().humidity, Some(40.0));
    }

    #[test]
    fn test_decode_format_a() {
        let data = service(&[("181a", format_a(202, 55))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() - 20.2).abs() < 1e-9);
        assert_eq!(reading.humidity, Some(55.0));
        assert_eq!(reading.temperature_source, Some(PayloadFormat::A));
        assert_eq!(reading.humidity_source, Some(PayloadFormat::A));
    }

    #[test]
    fn test_decode_format_a_humidity_out_of_range() {
        let data = service(&[("181a", format_a(202, 200))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() - 20.2).abs() < 1e-9);
        assert!(reading.humidity.is_none());
    }

    #[test]
    fn test_decode_format_a_negative_temperature() {
        let data = service(&[("181a", format_a(-55, 40))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() + 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_format_a_full_uuid_identifier() {
        let data = service(&[("0000181A-0000-1000-8000-00805F9B34FB", format_a(365, 30))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() - 36.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_format_a_too_short() {
        let data = service(&[("181a", vec![0; 8])]);
        assert!(decode(&data).is_none());
    }

    #[test]
    fn test_decode_format_b() {
        // 2345 / 100 = 23.45 °C
        let data = service(&[("fe95", format_b(2345, 61))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() - 23.45).abs() < 1e-9);
        assert_eq!(reading.humidity, Some(61.0));
        assert_eq!(reading.temperature_source, Some(PayloadFormat::B));
    }

    #[test]
    fn test_decode_format_b_wrong_frame_type() {
        let mut payload = format_b(2345, 61);
        payload[0] = 0x30;
        let data = service(&[("fe95", payload)]);
        assert!(decode(&data).is_none());
    }

    #[test]
    fn test_decode_format_b_too_short() {
        let data = service(&[("fe95", vec![FORMAT_B_FRAME_TYPE, 0, 0, 0, 0x29, 0x09])]);
        assert!(decode(&data).is_none());
    }

    #[test]
    fn test_format_a_wins_when_both_present() {
        let data = service(&[("181a", format_a(202, 55)), ("fe95", format_b(3000, 70))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() - 20.2).abs() < 1e-9);
        assert_eq!(reading.humidity, Some(55.0));
    }

    #[test]
    fn test_fields_fall_back_independently() {
        // Format A humidity is out of range, so humidity comes from Format B
        let data = service(&[("181a", format_a(202, 180)), ("fe95", format_b(3000, 70))]);

        let reading = decode(&data).unwrap();
        assert!((reading.temperature.unwrap() - 20.2).abs() < 1e-9);
        assert_eq!(reading.temperature_source, Some(PayloadFormat::A));
        assert_eq!(reading.humidity, Some(70.0));
        assert_eq!(reading.humidity_source, Some(PayloadFormat::B));
    }

    #[test]
    fn test_decode_unknown_service() {
        let data = service(&[("180f", vec![0x55; 12])]);
        assert!(decode(&data).is_none());
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode(&HashMap::new()).is_none());
    }

    #[test]
    fn test_into_readings() {
        let captured_at = OffsetDateTime::UNIX_EPOCH;
        let data = service(&[("181a", format_a(202, 55))]);

        let readings = decode(&data).unwrap().into_readings(captured_at);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].vital_type, TEMPERATURE);
        assert_eq!(readings[0].unit.as_deref(), Some("°C"));
        assert_eq!(readings[1].vital_type, HUMIDITY);
        assert_eq!(readings[1].value, 55.0);
        assert!(readings.iter().all(|r| r.timestamp == captured_at));
    }

    #[test]
    fn test_into_readings_temperature_only() {
        let data = service(&[("181a", format_a(202, 101))]);

        let readings = decode(&data)
            .unwrap()
            .into_readings(OffsetDateTime::UNIX_EPOCH);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].vital_type, TEMPERATURE);
    }

    #[test]
    fn test_is_recognized_sensor_by_service() {
        let data = service(&[("0000fe95-0000-1000-8000-00805f9b34fb", vec![])]);
        assert!(is_recognized_sensor(&data, None));
    }

    #[test]
    fn test_is_recognized_sensor_by_name() {
        let empty = HashMap::new();
        assert!(is_recognized_sensor(&empty, Some("ATC_8A1B2C")));
        assert!(is_recognized_sensor(&empty, Some("LYWSD03MMC")));
        assert!(is_recognized_sensor(&empty, Some("Ward Thermometer")));
        assert!(!is_recognized_sensor(&empty, Some("Heart Strap")));
        assert!(!is_recognized_sensor(&empty, None));
    }
}
