//! Google Maps Geocoding API client.
//!
//! Requires an API key. Google reports failures through a `status` field
//! in an HTTP 200 body, so [`parse_response`] maps those statuses onto
//! [`GeocodeError`] variants.
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use std::time::Duration;

use async_trait::async_trait;
use crime_log_source_models::BoundingBox;

use crate::{GeocodeError, GeocodeProvider, GeocodeQuery, GeocodedAddress, GeocodingProvider};

/// Google Maps Geocoding API client.
pub struct GoogleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleProvider {
    /// Creates a client against `base_url` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: String) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl GeocodeProvider for GoogleProvider {
    fn provider(&self) -> GeocodingProvider {
        GeocodingProvider::Google
    }

    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodedAddress, GeocodeError> {
        let mut params = vec![
            ("address", query.address.clone()),
            ("key", self.api_key.clone()),
        ];
        if let Some(bounds) = &query.bounds {
            params.push(("bounds", bounds_param(bounds)));
        }

        let resp = self.client.get(&self.base_url).query(&params).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if status.is_server_error() {
            return Err(GeocodeError::Unavailable {
                message: format!("HTTP {status}"),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Formats a bounding box as Google's `bounds` parameter
/// (`south,west|north,east`).
fn bounds_param(bounds: &BoundingBox) -> String {
    format!(
        "{},{}|{},{}",
        bounds.south, bounds.west, bounds.north, bounds.east
    )
}

/// Parses a Google geocoding response body.
///
/// # Errors
///
/// * `ZERO_RESULTS` => [`GeocodeError::ZeroResults`]
/// * `OVER_QUERY_LIMIT` => [`GeocodeError::RateLimited`]
/// * `REQUEST_DENIED` => [`GeocodeError::RequestDenied`]
/// * `INVALID_REQUEST` => [`GeocodeError::InvalidRequest`]
/// * any other non-`OK` status => [`GeocodeError::Unavailable`]
/// * `OK` without usable coordinates => [`GeocodeError::Parse`]
pub fn parse_response(body: &serde_json::Value) -> Result<GeocodedAddress, GeocodeError> {
    let status = body["status"].as_str().ok_or_else(|| GeocodeError::Parse {
        message: "Google response has no status".to_string(),
    })?;
    let message = body["error_message"].as_str().map(String::from);

    match status {
        "OK" => {}
        "ZERO_RESULTS" => return Err(GeocodeError::ZeroResults),
        "OVER_QUERY_LIMIT" => return Err(GeocodeError::RateLimited),
        "REQUEST_DENIED" => return Err(GeocodeError::RequestDenied { message }),
        "INVALID_REQUEST" => return Err(GeocodeError::InvalidRequest { message }),
        other => {
            return Err(GeocodeError::Unavailable {
                message: message.unwrap_or_else(|| other.to_string()),
            });
        }
    }

    let Some(first) = body["results"].as_array().and_then(|r| r.first()) else {
        return Err(GeocodeError::ZeroResults);
    };

    let location = &first["geometry"]["location"];
    let (Some(lat), Some(lng)) = (location["lat"].as_f64(), location["lng"].as_f64()) else {
        return Err(GeocodeError::Parse {
            message: "Missing geometry.location in Google response".to_string(),
        });
    };

    let mut neighborhood = None;
    let mut city = None;
    for component in first["address_components"].as_array().into_iter().flatten() {
        let name = component["long_name"].as_str().map(String::from);
        match component["types"][0].as_str() {
            Some("neighborhood") if neighborhood.is_none() => neighborhood = name,
            Some("locality") if city.is_none() => city = name,
            _ => {}
        }
    }

    Ok(GeocodedAddress {
        latitude: lat,
        longitude: lng,
        matched_address: first["formatted_address"].as_str().map(String::from),
        neighborhood,
        city,
        provider: GeocodingProvider::Google,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_body() -> serde_json::Value {
        json!({
            "status": "OK",
            "results": [{
                "formatted_address": "123 Main St, Providence, RI 02903, USA",
                "geometry": { "location": { "lat": 41.8236, "lng": -71.4222 } },
                "address_components": [
                    { "long_name": "123", "types": ["street_number"] },
                    { "long_name": "Downtown", "types": ["neighborhood", "political"] },
                    { "long_name": "Providence", "types": ["locality", "political"] },
                    { "long_name": "Rhode Island", "types": ["administrative_area_level_1"] }
                ]
            }]
        })
    }

    #[test]
    fn parses_ok_response() {
        let result = parse_response(&ok_body()).unwrap();
        assert!((result.latitude - 41.8236).abs() < 1e-6);
        assert!((result.longitude - -71.4222).abs() < 1e-6);
        assert_eq!(result.neighborhood.as_deref(), Some("Downtown"));
        assert_eq!(result.city.as_deref(), Some("Providence"));
        assert_eq!(result.provider, GeocodingProvider::Google);
    }

    #[test]
    fn component_type_must_be_first() {
        let mut body = ok_body();
        body["results"][0]["address_components"] = json!([
            { "long_name": "Providence County", "types": ["political", "locality"] }
        ]);
        let result = parse_response(&body).unwrap();
        assert!(result.city.is_none());
        assert!(result.neighborhood.is_none());
    }

    #[test]
    fn maps_error_statuses() {
        assert!(matches!(
            parse_response(&json!({"status": "ZERO_RESULTS", "results": []})),
            Err(GeocodeError::ZeroResults)
        ));
        assert!(matches!(
            parse_response(&json!({"status": "OVER_QUERY_LIMIT"})),
            Err(GeocodeError::RateLimited)
        ));
        assert!(matches!(
            parse_response(&json!({"status": "INVALID_REQUEST"})),
            Err(GeocodeError::InvalidRequest { message: None })
        ));
        assert!(matches!(
            parse_response(&json!({"status": "UNKNOWN_ERROR"})),
            Err(GeocodeError::Unavailable { .. })
        ));
    }

    #[test]
    fn request_denied_keeps_message() {
        let body = json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        });
        match parse_response(&body) {
            Err(GeocodeError::RequestDenied { message }) => {
                assert_eq!(message.as_deref(), Some("The provided API key is invalid."));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ok_without_location_is_parse_error() {
        let body = json!({ "status": "OK", "results": [{ "geometry": {} }] });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn missing_status_is_parse_error() {
        assert!(matches!(
            parse_response(&json!({})),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn bounds_format() {
        let bounds = BoundingBox {
            south: 41.7,
            west: -71.65,
            north: 42.0,
            east: -71.25,
        };
        assert_eq!(bounds_param(&bounds), "41.7,-71.65|42,-71.25");
    }
}
