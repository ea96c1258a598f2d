//! Broadcast service tags for supported wearable sensors.
//!
//! Identifiers arrive from the scanner in whatever form the platform uses
//! (`181a`, `0000181A-0000-1000-8000-00805F9B34FB`, ...), so tags are matched
//! as case-insensitive substrings.

/// 16-bit tag of the custom-firmware environmental layout (big-endian, ÷10).
pub const FORMAT_A_TAG: &str = "181a";

/// 16-bit tag of the vendor beacon layout (little-endian, ÷100).
pub const FORMAT_B_TAG: &str = "fe95";

/// Frame-type marker required at byte 0 of a Format B payload.
pub const FORMAT_B_FRAME_TYPE: u8 = 0x50;

/// Device-name fragments identifying temperature/humidity sensors.
pub const SENSOR_NAME_HINTS: &[&str] = &["atc_", "lywsd03", "mj_ht", "thermo", "hygro", "temp"];

/// Check whether a service identifier carries the given tag.
///
/// ```
/// use vitalsync_types::tags::{FORMAT_A_TAG, identifier_has_tag};
///
/// assert!(identifier_has_tag("0000181A-0000-1000-8000-00805F9B34FB", FORMAT_A_TAG));
/// assert!(!identifier_has_tag("0000180f-0000-1000-8000-00805f9b34fb", FORMAT_A_TAG));
/// ```
pub fn identifier_has_tag(identifier: &str, tag: &str) -> bool {
    identifier.to_ascii_lowercase().contains(tag)
}
