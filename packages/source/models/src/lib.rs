#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw and normalized incident record types.
//!
//! The remote case log returns [`RawRecord`] JSON objects. The normalizer
//! turns each into an [`IncidentRecord`], which is also the row type of the
//! persisted master datasets.

pub mod timestamp;

use chrono::NaiveDateTime;
use crime_log_crime_models::OffenseCategory;
use serde::{Deserialize, Serialize};

/// One incident object as returned by the case log API.
///
/// `casenumber`, `location` and `counts` are kept as raw JSON values because
/// the API does not guarantee their types (numbers, strings and nulls all
/// show up in practice).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Case identifier.
    #[serde(default)]
    pub casenumber: serde_json::Value,
    /// Report timestamp string (e.g. `"2021-05-01T13:45:00.000"`).
    #[serde(default)]
    pub reported_date: Option<String>,
    /// Free-text offense description.
    #[serde(default)]
    pub offense_desc: Option<String>,
    /// Street address or intersection.
    #[serde(default)]
    pub location: serde_json::Value,
    /// Number of offenses on the report. Zero for no-offense entries.
    #[serde(default)]
    pub counts: serde_json::Value,
    /// Statute description, when published.
    #[serde(default)]
    pub statute_desc: Option<String>,
}

/// An incident in canonical form.
///
/// Serialized column names follow the historical CSV layout of the master
/// files (`casenumber`, `reported_date`, `lat`, `lon`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Case identifier. Unique together with `reported_at`.
    #[serde(rename = "casenumber")]
    pub case_number: String,
    /// When the incident was reported (source local time).
    #[serde(rename = "reported_date", with = "timestamp")]
    pub reported_at: NaiveDateTime,
    /// Free-text offense description.
    #[serde(rename = "offense_desc")]
    pub offense_description: String,
    /// Category derived from the description.
    #[serde(rename = "offense_cat")]
    pub offense_category: OffenseCategory,
    /// Statute description, when published.
    #[serde(rename = "statute_desc", default)]
    pub statute_description: Option<String>,
    /// Address exactly as the source provided it.
    #[serde(default)]
    pub location_raw: Option<String>,
    /// Cleaned, title-cased address used as the geocode cache key.
    /// `None` when the source had no usable location.
    #[serde(rename = "location", default)]
    pub location_normalized: Option<String>,
    /// Report count. Zero marks a no-offense record.
    #[serde(rename = "counts")]
    pub count: u32,
    /// Latitude (WGS84), once resolved.
    #[serde(rename = "lat", default)]
    pub latitude: Option<f64>,
    /// Longitude (WGS84), once resolved.
    #[serde(rename = "lon", default)]
    pub longitude: Option<f64>,
    /// Neighborhood reported by the geocoder.
    #[serde(default)]
    pub neighborhood: Option<String>,
    /// City reported by the geocoder.
    #[serde(default)]
    pub city: Option<String>,
    /// Hour of `reported_at`.
    pub hour: u32,
    /// Minute of `reported_at`.
    pub minute: u32,
    /// Day of month of `reported_at`.
    pub day: u32,
    /// Month of `reported_at`.
    pub month: u32,
    /// Year of `reported_at`.
    pub year: i32,
}

impl IncidentRecord {
    /// Column order of the persisted CSV files, matching field order.
    pub const CSV_COLUMNS: [&'static str; 17] = [
        "casenumber",
        "reported_date",
        "offense_desc",
        "offense_cat",
        "statute_desc",
        "location_raw",
        "location",
        "counts",
        "lat",
        "lon",
        "neighborhood",
        "city",
        "hour",
        "minute",
        "day",
        "month",
        "year",
    ];

    /// The deduplication key of the master datasets.
    #[must_use]
    pub fn dedup_key(&self) -> (&str, NaiveDateTime) {
        (self.case_number.as_str(), self.reported_at)
    }

    /// Whether this record has a resolved coordinate.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Whether this is a no-offense record (`count == 0`).
    #[must_use]
    pub const fn is_no_offense(&self) -> bool {
        self.count == 0
    }
}

/// A geographic bounding box used to bias geocoder results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern latitude.
    pub south: f64,
    /// Western longitude.
    pub west: f64,
    /// Northern latitude.
    pub north: f64,
    /// Eastern longitude.
    pub east: f64,
}

impl BoundingBox {
    /// Whether the coordinate lies inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude)
            && (self.west..=self.east).contains(&longitude)
    }
}
