//! Config-driven case log source definition.
//!
//! [`SourceDefinition`] captures everything unique about a case log: how to
//! query it, where its incidents are (for geocoder biasing), and the offense
//! taxonomy used to classify its descriptions. Definitions are TOML, either
//! embedded via the [`registry`](crate::registry) or loaded from a file.

use std::path::Path;

use crime_log_crime_models::OffenseTaxonomy;
use crime_log_source_models::BoundingBox;
use serde::Deserialize;

use crate::socrata::SocrataSource;
use crate::{IncidentSource, SourceError};

/// A complete case log source definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"providence"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// City the incidents are in; appended to addresses for geocoding.
    pub city: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Optional URL to the human-readable data portal page.
    #[serde(default)]
    pub portal_url: Option<String>,
    /// How to fetch raw records from the API.
    pub fetcher: FetcherConfig,
    /// Area used to bias geocoder results.
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    /// Offense descriptions per category.
    #[serde(default)]
    pub taxonomy: OffenseTaxonomy,
}

/// How to fetch raw records from the source API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetcherConfig {
    /// Socrata SODA API queried with a SoQL `$query`.
    Socrata {
        /// Resource URL (e.g. `https://data.providenceri.gov/resource/rz3y-pz8v.json`).
        api_url: String,
        /// Timestamp column used for the incremental filter and ordering.
        date_column: String,
        /// Maximum records returned by one run.
        page_size: u64,
        /// Header carrying the API token.
        #[serde(default = "default_auth_header")]
        auth_header: String,
        /// Environment variable holding the API token.
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

fn default_auth_header() -> String {
    "X-App-Token".to_string()
}

impl SourceDefinition {
    /// Suffix appended to normalized addresses before geocoding
    /// (e.g. `", Providence, RI"`).
    #[must_use]
    pub fn city_state_suffix(&self) -> String {
        format!(", {}, {}", self.city, self.state)
    }

    /// Maximum number of records fetched per run.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        match &self.fetcher {
            FetcherConfig::Socrata { page_size, .. } => *page_size,
        }
    }

    /// Builds the fetcher for this source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the HTTP client cannot be built.
    pub fn build_source(&self) -> Result<Box<dyn IncidentSource>, SourceError> {
        match &self.fetcher {
            FetcherConfig::Socrata {
                api_url,
                date_column,
                page_size,
                auth_header,
                api_key_env,
            } => {
                let api_key = api_key_env.as_deref().and_then(|var| {
                    let key = std::env::var(var).ok().filter(|k| !k.is_empty());
                    if key.is_none() {
                        log::warn!("{}: {var} is not set, querying without an API token", self.id);
                    }
                    key
                });
                Ok(Box::new(SocrataSource::new(
                    &self.id,
                    api_url,
                    date_column,
                    *page_size,
                    auth_header,
                    api_key,
                )?))
            }
        }
    }
}

/// Parses a TOML string into a [`SourceDefinition`].
///
/// # Errors
///
/// Returns an error string if the TOML is invalid.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

/// Loads a source definition from a TOML file on disk.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read or parsed.
pub fn load_source_file(path: &Path) -> Result<SourceDefinition, SourceError> {
    let text = std::fs::read_to_string(path)?;
    parse_source_toml(&text).map_err(|message| SourceError::Config {
        message: format!("{}: {message}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const MINIMAL: &str = r#"
id = "testville"
name = "Testville PD"
city = "Testville"
state = "TV"

[fetcher]
type = "socrata"
api_url = "https://example.org/resource/abcd-1234.json"
date_column = "reported_date"
page_size = 500

[taxonomy]
violent = ["Assault, Simple"]
property = ["Burglary"]
"#;

    #[test]
    fn parses_minimal_definition() {
        let def = parse_source_toml(MINIMAL).unwrap();
        assert_eq!(def.id, "testville");
        assert_eq!(def.page_size(), 500);
        assert_eq!(def.city_state_suffix(), ", Testville, TV");
        assert!(def.bounds.is_none());
        let FetcherConfig::Socrata {
            auth_header,
            api_key_env,
            ..
        } = &def.fetcher;
        assert_eq!(auth_header, "X-App-Token");
        assert!(api_key_env.is_none());
        assert!(def.taxonomy.violent.contains("Assault, Simple"));
    }

    #[test]
    fn rejects_unknown_fetcher_type() {
        let bad = MINIMAL.replace("type = \"socrata\"", "type = \"ftp\"");
        assert!(parse_source_toml(&bad).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let def = load_source_file(file.path()).unwrap();
        assert_eq!(def.name, "Testville PD");
    }

    #[test]
    fn load_reports_config_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"id = ").unwrap();
        assert!(matches!(
            load_source_file(file.path()),
            Err(SourceError::Config { .. })
        ));
    }
}
