//! Nominatim / OpenStreetMap geocoder client.
//!
//! Nominatim has strict rate limits: **1 request per second** maximum on
//! the public instance. The chain enforces this through `rate_limit_ms` in
//! the service TOML configuration.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::Duration;

use async_trait::async_trait;
use crime_log_source_models::BoundingBox;

use crate::{GeocodeError, GeocodeProvider, GeocodeQuery, GeocodedAddress, GeocodingProvider};

/// Free-form Nominatim search client.
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
    email: Option<String>,
}

impl NominatimProvider {
    /// Creates a client against `base_url`.
    ///
    /// `email` is sent with every request as the usage policy asks of
    /// heavy users.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, email: Option<String>) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crime_log/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            email,
        })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    fn provider(&self) -> GeocodingProvider {
        GeocodingProvider::Nominatim
    }

    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodedAddress, GeocodeError> {
        let mut params = vec![
            ("q", query.address.clone()),
            ("countrycodes", "us".to_string()),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", "1".to_string()),
        ];
        if let Some(bounds) = &query.bounds {
            params.push(("viewbox", viewbox(bounds)));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }

        let resp = self.client.get(&self.base_url).query(&params).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(GeocodeError::RequestDenied {
                message: Some(format!("HTTP {status}")),
            });
        }
        if status.is_client_error() {
            return Err(GeocodeError::InvalidRequest {
                message: Some(format!("HTTP {status}")),
            });
        }
        if !status.is_success() {
            return Err(GeocodeError::Unavailable {
                message: format!("HTTP {status}"),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Formats a bounding box as a Nominatim `viewbox` (`west,north,east,south`).
///
/// Without `bounded=1` the box only biases results.
fn viewbox(bounds: &BoundingBox) -> String {
    format!(
        "{},{},{},{}",
        bounds.west, bounds.north, bounds.east, bounds.south
    )
}

/// Parses a Nominatim `jsonv2` response.
fn parse_response(body: &serde_json::Value) -> Result<GeocodedAddress, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Err(GeocodeError::ZeroResults);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let lon = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    let address = &first["address"];
    let first_of = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| address[*k].as_str())
            .map(String::from)
    };

    Ok(GeocodedAddress {
        latitude: lat,
        longitude: lon,
        matched_address: first["display_name"].as_str().map(String::from),
        neighborhood: first_of(&["neighbourhood", "suburb", "quarter"]),
        city: first_of(&["city", "town", "village"]),
        provider: GeocodingProvider::Nominatim,
    })
}
