#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding client for crime log addresses.
//!
//! Converts normalized street addresses to latitude/longitude coordinates
//! using a provider chain configured via TOML files in `services/`:
//!
//! 1. **Nominatim / OpenStreetMap** (priority 1): free, no API key,
//!    1 req/sec rate limit.
//! 2. **Google Maps Geocoding API** (priority 2): requires an API key.
//!
//! Every provider implements [`GeocodeProvider`]. The [`chain`] module
//! tries them in priority order, retrying rate-limited requests on the
//! same provider before falling back to the next one.

pub mod chain;
pub mod google;
pub mod nominatim;
pub mod rate_limit;
pub mod service_registry;

use async_trait::async_trait;
use crime_log_source_models::BoundingBox;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// A geocoding result with coordinates and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The matched/canonical address returned by the geocoder.
    pub matched_address: Option<String>,
    /// Neighborhood, when the provider reports one.
    pub neighborhood: Option<String>,
    /// City / locality, when the provider reports one.
    pub city: Option<String>,
    /// Which provider resolved this address.
    pub provider: GeocodingProvider,
}

/// Which geocoding provider resolved an address.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeocodingProvider {
    /// Nominatim / OpenStreetMap.
    Nominatim,
    /// Google Maps Geocoding API.
    Google,
}

/// An address to be geocoded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeQuery {
    /// Full one-line address including city and state
    /// (e.g. `"123 Main At Pine, Providence, RI"`).
    pub address: String,
    /// Area to bias results toward.
    pub bounds: Option<BoundingBox>,
}

impl GeocodeQuery {
    /// Builds a query by appending a `", City, ST"` suffix to a normalized
    /// address.
    #[must_use]
    pub fn with_suffix(normalized: &str, suffix: &str, bounds: Option<BoundingBox>) -> Self {
        Self {
            address: format!("{normalized}{suffix}"),
            bounds,
        }
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The provider found no match for the address.
    #[error("No results")]
    ZeroResults,

    /// Rate limit or quota exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The provider refused the request (bad or missing credential).
    #[error("Request denied: {}", message.as_deref().unwrap_or("no detail"))]
    RequestDenied {
        /// Provider-supplied detail.
        message: Option<String>,
    },

    /// The provider rejected the request as malformed.
    #[error("Invalid request: {}", message.as_deref().unwrap_or("no detail"))]
    InvalidRequest {
        /// Provider-supplied detail.
        message: Option<String>,
    },

    /// The provider is temporarily failing (5xx, unknown error status).
    #[error("Provider unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// A geocoding service that resolves one address at a time.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Which provider this is.
    fn provider(&self) -> GeocodingProvider;

    /// Resolves a single address.
    ///
    /// A miss is reported as [`GeocodeError::ZeroResults`], never as
    /// `Ok` with placeholder coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] on a miss, rate limit, rejection, or
    /// transport/parse failure.
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodedAddress, GeocodeError>;
}
