//! Compile-time registry of geocoding service configurations.
//!
//! Each geocoding provider is defined in a TOML file under `services/`.
//! The registry embeds these at compile time and exposes them via
//! [`all_services`] and [`enabled_services`]. [`build_chain`] turns the
//! enabled services into a [`GeocoderChain`], reading credentials from the
//! environment.

use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;
use crate::chain::{GeocoderChain, RateLimitPolicy};
use crate::google::GoogleProvider;
use crate::nominatim::NominatimProvider;

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"nominatim"`, `"google"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service is active in the geocoding pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Execution order. Lower values run first.
    pub priority: u32,
    /// Minimum delay between requests in milliseconds.
    pub rate_limit_ms: u64,
    /// Retries on the same provider after a rate-limit response.
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,
    /// Wait before each rate-limit retry, in milliseconds.
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// API base URL (e.g., `"https://nominatim.openstreetmap.org/search"`).
        base_url: String,
        /// Environment variable holding a contact email, if any.
        #[serde(default)]
        email_env: Option<String>,
    },
    /// Google Maps Geocoding API.
    Google {
        /// API base URL.
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_rate_limit_retries() -> u32 {
    2
}

const fn default_rate_limit_backoff_ms() -> u64 {
    30_000
}

impl GeocodingService {
    /// Returns the provider's base URL regardless of variant.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::Nominatim { base_url, .. }
            | ProviderConfig::Google { base_url, .. } => base_url,
        }
    }

    /// The environment variable this service reads a credential from.
    #[must_use]
    pub fn credential_env(&self) -> Option<&str> {
        match &self.provider {
            ProviderConfig::Nominatim { email_env, .. } => email_env.as_deref(),
            ProviderConfig::Google { api_key_env, .. } => Some(api_key_env),
        }
    }

    /// Rate-limit handling for this service.
    #[must_use]
    pub const fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            min_interval: Duration::from_millis(self.rate_limit_ms),
            max_retries: self.rate_limit_retries,
            backoff: Duration::from_millis(self.rate_limit_backoff_ms),
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("nominatim", include_str!("../services/nominatim.toml")),
    ("google", include_str!("../services/google.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 2;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Builds a provider chain from `services`, in the order given.
///
/// Services whose required credential is missing from the environment are
/// skipped with a warning.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if an HTTP client cannot be built.
pub fn build_chain(services: &[GeocodingService]) -> Result<GeocoderChain, GeocodeError> {
    build_chain_with(services, |key| std::env::var(key).ok())
}

/// [`build_chain`] with an injectable environment lookup.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if an HTTP client cannot be built.
pub fn build_chain_with(
    services: &[GeocodingService],
    env: impl Fn(&str) -> Option<String>,
) -> Result<GeocoderChain, GeocodeError> {
    let mut chain = GeocoderChain::new();

    for service in services {
        let policy = service.rate_limit_policy();
        match &service.provider {
            ProviderConfig::Nominatim {
                base_url,
                email_env,
            } => {
                let email = email_env
                    .as_deref()
                    .and_then(&env)
                    .filter(|e| !e.trim().is_empty());
                if email.is_none() {
                    log::debug!("{}: no contact email configured", service.id);
                }
                let provider = NominatimProvider::new(base_url, email)?;
                chain = chain.with_provider(Box::new(provider), policy);
            }
            ProviderConfig::Google {
                base_url,
                api_key_env,
            } => {
                let Some(key) = env(api_key_env).filter(|k| !k.trim().is_empty()) else {
                    log::warn!(
                        "{}: {api_key_env} not set, skipping {}",
                        service.id,
                        service.name
                    );
                    continue;
                };
                let provider = GoogleProvider::new(base_url, key)?;
                chain = chain.with_provider(Box::new(provider), policy);
            }
        }
        log::info!(
            "Geocoder: {} (priority {}, {}ms between requests)",
            service.name,
            service.priority,
            service.rate_limit_ms
        );
    }

    Ok(chain)
}
