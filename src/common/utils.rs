//! Utility functions for ringproxy

use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Percent-encoding set for path segments (includes /, %, and control chars)
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a resource name for use as a single URL path segment
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT_ENCODE_SET).to_string()
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else {
        let split = s.len() - s.chars().last().map(char::len_utf8).unwrap_or(0);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(std::time::Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };
    let secs = num
        .checked_mul(secs_per_unit)
        .ok_or_else(|| crate::Error::InvalidConfig(format!("duration too large: {}", s)))?;

    Ok(std::time::Duration::from_secs(secs))
}

/// Parse a duration string into whole milliseconds
pub fn parse_millis(s: &str) -> crate::Result<u64> {
    let duration = parse_duration(s)?;
    u64::try_from(duration.as_millis())
        .map_err(|_| crate::Error::InvalidConfig(format!("duration too large: {}", s)))
}

/// Format a Unix time in seconds the way storage nodes expect `X-Timestamp`:
/// zero-padded to 16 characters with 5 decimal places.
pub fn normalize_timestamp(secs: f64) -> String {
    format!("{:016.5}", secs)
}

/// Current time as a normalized timestamp
pub fn timestamp_now() -> String {
    let micros = Utc::now().timestamp_micros();
    normalize_timestamp(micros as f64 / 1_000_000.0)
}
