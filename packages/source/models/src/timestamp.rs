//! Timestamp formats used by the case log.
//!
//! The API publishes `reported_date` as `%Y-%m-%dT%H:%M:%S%.f`. Older
//! extracts and hand-edited master files use other layouts, so
//! [`parse_flexible`] tries a list of fallbacks after the fixed format.
//!
//! The module also provides serde `with` functions for the master files.
//! Written values keep every fractional digit the parsed value had, so a
//! timestamp read back from a master compares equal to the fetched one.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike as _};
use serde::{Deserialize as _, Deserializer, Serializer};

/// The documented source format.
pub const SOURCE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Format used when writing millisecond-exact timestamps. Also the SoQL
/// literal format, since the API stores milliseconds.
pub const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

const MICROS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const NANOS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";

const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parses with the fixed source format only.
#[must_use]
pub fn parse_source(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), SOURCE_FORMAT).ok()
}

/// Parses with the source format, then each fallback layout, then RFC 3339
/// and finally a bare date (midnight).
#[must_use]
pub fn parse_flexible(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Some(dt) = parse_source(s) {
        return Some(dt);
    }
    for fmt in FALLBACK_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Formats a timestamp losslessly: [`OUTPUT_FORMAT`] when the value is
/// millisecond-exact, six or nine fractional digits otherwise.
#[must_use]
pub fn format(dt: &NaiveDateTime) -> String {
    let nanos = dt.nanosecond() % 1_000_000_000;
    let fmt = if nanos % 1_000_000 == 0 {
        OUTPUT_FORMAT
    } else if nanos % 1_000 == 0 {
        MICROS_FORMAT
    } else {
        NANOS_FORMAT
    };
    dt.format(fmt).to_string()
}

/// Formats a timestamp as a SoQL literal, truncated to milliseconds.
#[must_use]
pub fn format_query(dt: &NaiveDateTime) -> String {
    dt.format(OUTPUT_FORMAT).to_string()
}

/// Serde serializer for `#[serde(with = "timestamp")]`.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(dt))
}

/// Serde deserializer for `#[serde(with = "timestamp")]`.
///
/// # Errors
///
/// Fails when the string matches none of the known layouts.
pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_flexible(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {s:?}")))
}
