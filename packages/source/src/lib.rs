#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Case log source: incremental fetching and record normalization.
//!
//! A source implements [`IncidentSource`] to return the raw records newer
//! than a given timestamp. The [`normalize`] module turns those records
//! into canonical [`IncidentRecord`](crime_log_source_models::IncidentRecord)s.

pub mod address;
pub mod normalize;
pub mod parsing;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod socrata;
pub mod source_def;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use crime_log_source_models::RawRecord;

/// Errors that can occur while fetching from a source.
///
/// Any of these aborts an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (reading a config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-retryable status (e.g. 401/403 when
    /// the API token is rejected).
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status.
        status: reqwest::StatusCode,
        /// Request URL.
        url: String,
    },

    /// Invalid source configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

/// A remote case log that can be queried incrementally.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"providence"`).
    fn id(&self) -> &str;

    /// Returns the raw records reported strictly after `since`, oldest
    /// first. `None` fetches from the start of the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, authentication or decode
    /// failure.
    async fn fetch_new(&self, since: Option<NaiveDateTime>)
    -> Result<Vec<RawRecord>, SourceError>;
}
