//! Field coercion helpers for raw case log values.
//!
//! The API serializes most columns as strings, but numeric columns are
//! occasionally sent as JSON numbers (or as floats such as `"1.0"` in older
//! extracts), so each helper accepts both.

use chrono::NaiveDateTime;
use crime_log_source_models::timestamp;

/// Coerces a `counts` value to a non-negative integer.
///
/// Accepts integer numbers, integral floats, and strings holding either.
/// Returns `None` for anything else (negative, fractional, null, text).
#[must_use]
pub fn coerce_count(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| n.as_f64().and_then(integral_f64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<u32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integral_f64(v: f64) -> Option<u32> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) {
        Some(v as u32)
    } else {
        None
    }
}

/// Extracts a case number as a trimmed, non-empty string.
#[must_use]
pub fn case_number(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a `reported_date` string.
///
/// Returns the timestamp and whether the fallback parser was needed.
#[must_use]
pub fn parse_reported_date(s: &str) -> Option<(NaiveDateTime, bool)> {
    if let Some(dt) = timestamp::parse_source(s) {
        return Some((dt, false));
    }
    timestamp::parse_flexible(s).map(|dt| (dt, true))
}
