//! Limits on resource names and user metadata

use axum::http::HeaderMap;

pub const MAX_ACCOUNT_NAME_LENGTH: usize = 256;
pub const MAX_META_NAME_LENGTH: usize = 128;
pub const MAX_META_VALUE_LENGTH: usize = 256;
pub const MAX_META_COUNT: usize = 90;
pub const MAX_META_OVERALL_SIZE: usize = 4096;

/// Reject names longer than `max` bytes
pub fn check_name_length(kind: &str, name: &str, max: usize) -> crate::Result<()> {
    if name.len() > max {
        return Err(crate::Error::BadRequest(format!(
            "{} name length of {} longer than {}",
            kind,
            name.len(),
            max
        )));
    }
    Ok(())
}

/// Validate user metadata headers (`x-{server_type}-meta-*`).
///
/// System metadata and removal headers are not counted.
pub fn check_metadata(headers: &HeaderMap, server_type: &str) -> crate::Result<()> {
    let prefix = format!("x-{}-meta-", server_type);
    let mut meta_count = 0;
    let mut meta_size = 0;

    for (name, value) in headers {
        let lower = name.as_str();
        let Some(key) = lower.strip_prefix(prefix.as_str()) else {
            continue;
        };
        let value = value.as_bytes();
        meta_count += 1;
        meta_size += key.len() + value.len();

        if key.is_empty() {
            return Err(crate::Error::BadRequest(
                "Metadata name cannot be empty".into(),
            ));
        }
        if key.len() > MAX_META_NAME_LENGTH {
            return Err(crate::Error::BadRequest(format!(
                "Metadata name too long; max {}",
                MAX_META_NAME_LENGTH
            )));
        }
        if value.len() > MAX_META_VALUE_LENGTH {
            return Err(crate::Error::BadRequest(format!(
                "Metadata value longer than {}",
                MAX_META_VALUE_LENGTH
            )));
        }
        if meta_count > MAX_META_COUNT {
            return Err(crate::Error::BadRequest(format!(
                "Too many metadata items; max {}",
                MAX_META_COUNT
            )));
        }
        if meta_size > MAX_META_OVERALL_SIZE {
            return Err(crate::Error::BadRequest(format!(
                "Total metadata too large; max {}",
                MAX_META_OVERALL_SIZE
            )));
        }
    }
    Ok(())
}
