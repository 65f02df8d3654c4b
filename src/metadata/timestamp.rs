//! W3CDTF timestamps.
//!
//! Written as `2014-03-27T14:02:11Z`. Readers in the wild also emit
//! offsets, fractional seconds, a space instead of `T` or a bare date, so
//! parsing is lenient and always lands in UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::MetadataError;

const W3CDTF_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Naive layouts tried after RFC 3339, all taken as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M",
];

pub fn format_w3cdtf(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(W3CDTF_FORMAT).to_string()
}

pub fn parse_w3cdtf(text: &str) -> Result<DateTime<Utc>, MetadataError> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // rfc3339 with a space separator
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text.replacen(' ', "T", 1)) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }

    Err(MetadataError::Timestamp(text.to_string()))
}
