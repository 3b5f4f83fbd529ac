//! Raw record normalization.
//!
//! [`normalize`] is a pure function from a [`RawRecord`] to an
//! [`IncidentRecord`]: it parses the timestamp, derives the time parts,
//! coerces the count, cleans the location and classifies the offense.
//! Malformed records are reported as [`ParseError`]s and dropped by
//! [`normalize_batch`] without failing the batch.

use std::collections::BTreeMap;

use chrono::{Datelike as _, Timelike as _};
use crime_log_crime_models::OffenseTaxonomy;
use crime_log_source_models::{IncidentRecord, RawRecord};

use crate::address::{location_text, normalize_location};
use crate::parsing::{case_number, coerce_count, parse_reported_date};

/// Why a raw record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The record has no usable case number.
    #[error("missing case number")]
    MissingCaseNumber,

    /// The record has no `reported_date`.
    #[error("missing reported_date")]
    MissingTimestamp,

    /// `reported_date` matched neither the source format nor a fallback.
    #[error("unparseable reported_date {value:?}")]
    InvalidTimestamp {
        /// The offending value.
        value: String,
    },

    /// `counts` is not a non-negative integer.
    #[error("non-numeric counts {value}")]
    InvalidCount {
        /// The offending value, JSON-encoded.
        value: String,
    },
}

impl ParseError {
    /// Short, stable label used to group drops in run summaries.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingCaseNumber => "missing_case_number",
            Self::MissingTimestamp => "missing_timestamp",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::InvalidCount { .. } => "invalid_count",
        }
    }
}

/// A raw record that was excluded from the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRecord {
    /// Case number, when one could be read.
    pub case_number: Option<String>,
    /// Why the record was dropped.
    pub error: ParseError,
}

/// Output of [`normalize_batch`].
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Successfully normalized records, in input order.
    pub records: Vec<IncidentRecord>,
    /// Records that were excluded.
    pub dropped: Vec<DroppedRecord>,
}

impl NormalizedBatch {
    /// Number of dropped records per [`ParseError::reason`].
    #[must_use]
    pub fn dropped_by_reason(&self) -> BTreeMap<&'static str, u64> {
        let mut counts = BTreeMap::new();
        for d in &self.dropped {
            *counts.entry(d.error.reason()).or_insert(0) += 1;
        }
        counts
    }
}

/// Normalizes a single raw record.
///
/// # Errors
///
/// Returns [`ParseError`] when the case number, timestamp or count is
/// missing or malformed.
pub fn normalize(
    raw: &RawRecord,
    taxonomy: &OffenseTaxonomy,
) -> Result<IncidentRecord, ParseError> {
    let case_number = case_number(&raw.casenumber).ok_or(ParseError::MissingCaseNumber)?;

    let date_str = raw
        .reported_date
        .as_deref()
        .ok_or(ParseError::MissingTimestamp)?;
    let (reported_at, used_fallback) =
        parse_reported_date(date_str).ok_or_else(|| ParseError::InvalidTimestamp {
            value: date_str.to_string(),
        })?;
    if used_fallback {
        log::debug!("{case_number}: reported_date {date_str:?} needed the fallback parser");
    }

    let count = coerce_count(&raw.counts).ok_or_else(|| ParseError::InvalidCount {
        value: raw.counts.to_string(),
    })?;

    let offense_description = raw.offense_desc.clone().unwrap_or_default();
    let offense_category = taxonomy.classify(&offense_description);

    let location_raw = location_text(&raw.location);
    let location_normalized = location_raw.as_deref().and_then(normalize_location);

    Ok(IncidentRecord {
        case_number,
        reported_at,
        offense_description,
        offense_category,
        statute_description: raw.statute_desc.clone(),
        location_raw,
        location_normalized,
        count,
        latitude: None,
        longitude: None,
        neighborhood: None,
        city: None,
        hour: reported_at.hour(),
        minute: reported_at.minute(),
        day: reported_at.day(),
        month: reported_at.month(),
        year: reported_at.year(),
    })
}

/// Normalizes every record, collecting failures instead of aborting.
#[must_use]
pub fn normalize_batch(raws: &[RawRecord], taxonomy: &OffenseTaxonomy) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in raws {
        match normalize(raw, taxonomy) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                let case_number = case_number(&raw.casenumber);
                log::warn!(
                    "Dropping record {}: {error}",
                    case_number.as_deref().unwrap_or("<no case number>")
                );
                batch.dropped.push(DroppedRecord { case_number, error });
            }
        }
    }

    batch
}

/// Splits records into `(offense, no_offense)` by `count > 0`.
#[must_use]
pub fn split_by_count(records: Vec<IncidentRecord>) -> (Vec<IncidentRecord>, Vec<IncidentRecord>) {
    let (no_offense, offense): (Vec<_>, Vec<_>) =
        records.into_iter().partition(IncidentRecord::is_no_offense);
    (offense, no_offense)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crime_log_crime_models::OffenseCategory;
    use serde_json::json;

    fn taxonomy() -> OffenseTaxonomy {
        OffenseTaxonomy::new(["Assault, Aggravated"], ["Burglary"])
    }

    fn raw(case: &str, counts: serde_json::Value) -> RawRecord {
        RawRecord {
            casenumber: json!(case),
            reported_date: Some("2021-05-01T13:45:00.000".to_string()),
            offense_desc: Some("Burglary".to_string()),
            location: json!("123 Main & Pine"),
            counts,
            statute_desc: None,
        }
    }

    #[test]
    fn normalizes_full_record() {
        let record = normalize(&raw("2021-1", json!("1")), &taxonomy()).unwrap();
        assert_eq!(record.case_number, "2021-1");
        assert_eq!(record.location_raw.as_deref(), Some("123 Main & Pine"));
        assert_eq!(
            record.location_normalized.as_deref(),
            Some("123 Main At Pine")
        );
        assert_eq!(record.offense_category, OffenseCategory::Property);
        assert_eq!(record.count, 1);
        assert_eq!((record.hour, record.minute, record.day), (13, 45, 1));
        assert_eq!((record.month, record.year), (5, 2021));
        assert!(!record.has_coordinates());
    }

    #[test]
    fn classifies_descriptions() {
        let t = taxonomy();
        let mut r = raw("1", json!(1));
        r.offense_desc = Some("Assault, Aggravated".to_string());
        assert_eq!(
            normalize(&r, &t).unwrap().offense_category,
            OffenseCategory::Violent
        );
        r.offense_desc = Some("Jaywalking".to_string());
        assert_eq!(
            normalize(&r, &t).unwrap().offense_category,
            OffenseCategory::Other
        );
    }

    #[test]
    fn uses_fallback_timestamp_parser() {
        let mut r = raw("1", json!(1));
        r.reported_date = Some("2021-05-01 08:05:00".to_string());
        let record = normalize(&r, &taxonomy()).unwrap();
        assert_eq!((record.hour, record.minute), (8, 5));
    }

    #[test]
    fn null_location_is_unresolvable() {
        let mut r = raw("1", json!(1));
        r.location = serde_json::Value::Null;
        let record = normalize(&r, &taxonomy()).unwrap();
        assert!(record.location_raw.is_none());
        assert!(record.location_normalized.is_none());
    }

    #[test]
    fn reports_parse_errors() {
        let t = taxonomy();

        let mut r = raw("1", json!(1));
        r.reported_date = Some("garbage".to_string());
        assert_eq!(
            normalize(&r, &t),
            Err(ParseError::InvalidTimestamp {
                value: "garbage".to_string()
            })
        );

        let r = raw("1", json!("many"));
        assert!(matches!(
            normalize(&r, &t),
            Err(ParseError::InvalidCount { .. })
        ));

        let mut r = raw("1", json!(1));
        r.casenumber = serde_json::Value::Null;
        assert_eq!(normalize(&r, &t), Err(ParseError::MissingCaseNumber));
    }

    #[test]
    fn batch_drops_malformed_records() {
        let mut bad_date = raw("2", json!(1));
        bad_date.reported_date = None;
        let raws = vec![raw("1", json!(1)), bad_date, raw("3", json!("x"))];

        let batch = normalize_batch(&raws, &taxonomy());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.dropped.len(), 2);
        assert_eq!(batch.dropped[0].case_number.as_deref(), Some("2"));

        let reasons = batch.dropped_by_reason();
        assert_eq!(reasons.get("missing_timestamp"), Some(&1));
        assert_eq!(reasons.get("invalid_count"), Some(&1));
    }

    #[test]
    fn splits_by_count() {
        let raws: Vec<RawRecord> = [0, 1, 3, 0]
            .iter()
            .enumerate()
            .map(|(i, c)| raw(&i.to_string(), json!(c)))
            .collect();
        let batch = normalize_batch(&raws, &taxonomy());
        let (offense, no_offense) = split_by_count(batch.records);
        assert_eq!(offense.len(), 2);
        assert_eq!(no_offense.len(), 2);
        assert!(offense.iter().all(|r| r.count > 0));
        assert!(no_offense.iter().all(|r| r.count == 0));
    }
}
