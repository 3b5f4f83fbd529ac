//! Incremental Socrata SODA fetcher.
//!
//! Each run issues one SoQL `$query` selecting the records whose date
//! column is strictly greater than the newest timestamp already stored,
//! ordered oldest first and capped at the configured page size.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use crime_log_source_models::{RawRecord, timestamp};

use crate::{IncidentSource, SourceError, retry};

/// Per-request timeout for the case log API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A Socrata dataset queried incrementally by a timestamp column.
pub struct SocrataSource {
    id: String,
    client: reqwest::Client,
    api_url: String,
    date_column: String,
    page_size: u64,
    auth_header: String,
    api_key: Option<String>,
}

impl SocrataSource {
    /// Creates a fetcher for one Socrata resource.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(
        id: &str,
        api_url: &str,
        date_column: &str,
        page_size: u64,
        auth_header: &str,
        api_key: Option<String>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            id: id.to_string(),
            client,
            api_url: api_url.to_string(),
            date_column: date_column.to_string(),
            page_size,
            auth_header: auth_header.to_string(),
            api_key,
        })
    }

    /// The SoQL query for records newer than `since`.
    #[must_use]
    pub fn query(&self, since: Option<NaiveDateTime>) -> String {
        build_query(&self.date_column, since, self.page_size)
    }
}

/// Builds the SoQL query selecting records strictly newer than `since`,
/// ascending by `date_column`, limited to `page_size` rows.
#[must_use]
pub fn build_query(date_column: &str, since: Option<NaiveDateTime>, page_size: u64) -> String {
    let filter = since.map_or_else(String::new, |since| {
        format!(" WHERE {date_column} > '{}'", timestamp::format_query(&since))
    });
    format!("SELECT *{filter} ORDER BY {date_column} LIMIT {page_size}")
}

#[async_trait]
impl IncidentSource for SocrataSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_new(
        &self,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let query = self.query(since);
        log::info!("{}: querying {} with {query:?}", self.id, self.api_url);

        let body = retry::send_json(|| {
            let request = self
                .client
                .get(&self.api_url)
                .query(&[("$query", query.as_str())]);
            match &self.api_key {
                Some(key) => request.header(self.auth_header.as_str(), key.as_str()),
                None => request,
            }
        })
        .await?;

        let records: Vec<RawRecord> = serde_json::from_value(body)?;
        log::info!("{}: fetched {} new records", self.id, records.len());

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn query_filters_strictly_after_since() {
        let since = NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            build_query("reported_date", Some(since), 13_000),
            "SELECT * WHERE reported_date > '2021-05-01T00:00:00.000' \
             ORDER BY reported_date LIMIT 13000"
        );
    }

    #[test]
    fn first_run_has_no_filter() {
        assert_eq!(
            build_query("reported_date", None, 100),
            "SELECT * ORDER BY reported_date LIMIT 100"
        );
    }

    #[test]
    fn source_uses_configured_column_and_limit() {
        let source = SocrataSource::new(
            "test",
            "https://example.org/resource/x.json",
            "date_rep",
            10,
            "X-App-Token",
            None,
        )
        .unwrap();
        assert_eq!(source.id(), "test");
        assert_eq!(source.query(None), "SELECT * ORDER BY date_rep LIMIT 10");
    }
}
