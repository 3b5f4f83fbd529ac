//! Ordered provider fallback.
//!
//! A [`GeocoderChain`] tries each provider in priority order. Rate-limited
//! requests are retried on the same provider after a backoff, up to a
//! bound; every other failure moves on to the next provider. The first
//! success wins. When every provider misses, the address is unresolved.

use std::time::Duration;

use crate::rate_limit::RateLimiter;
use crate::{GeocodeError, GeocodeProvider, GeocodeQuery, GeocodedAddress, GeocodingProvider};

/// How a provider's rate-limit responses are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Minimum interval between requests to this provider.
    pub min_interval: Duration,
    /// Retries allowed after a [`GeocodeError::RateLimited`] response.
    pub max_retries: u32,
    /// Wait before each retry.
    pub backoff: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_retries: 2,
            backoff: Duration::from_secs(30),
        }
    }
}

struct ChainLink {
    provider: Box<dyn GeocodeProvider>,
    limiter: RateLimiter,
    policy: RateLimitPolicy,
}

/// Every provider missed. Holds each provider's final error, in order.
#[derive(Debug, Default)]
pub struct Unresolved {
    /// `(provider, error)` for every provider tried.
    pub attempts: Vec<(GeocodingProvider, GeocodeError)>,
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no geocoding providers configured");
        }
        for (i, (provider, err)) in self.attempts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{provider}: {err}")?;
        }
        Ok(())
    }
}

/// Providers in priority order, each with its own rate limiter.
#[derive(Default)]
pub struct GeocoderChain {
    links: Vec<ChainLink>,
}

impl GeocoderChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider after every provider already in the chain.
    #[must_use]
    pub fn with_provider(
        mut self,
        provider: Box<dyn GeocodeProvider>,
        policy: RateLimitPolicy,
    ) -> Self {
        self.links.push(ChainLink {
            provider,
            limiter: RateLimiter::new(policy.min_interval),
            policy,
        });
        self
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The providers in the order they are tried.
    #[must_use]
    pub fn providers(&self) -> Vec<GeocodingProvider> {
        self.links.iter().map(|l| l.provider.provider()).collect()
    }

    /// Resolves one address, trying each provider in order.
    ///
    /// # Errors
    ///
    /// Returns [`Unresolved`] when no provider produced coordinates.
    pub async fn resolve(&self, query: &GeocodeQuery) -> Result<GeocodedAddress, Unresolved> {
        let mut unresolved = Unresolved::default();

        for link in &self.links {
            let provider = link.provider.provider();
            match link.attempt(query).await {
                Ok(found) => {
                    log::debug!("{provider} resolved '{}'", query.address);
                    return Ok(found);
                }
                Err(e) => {
                    match &e {
                        GeocodeError::ZeroResults => {
                            log::debug!("{provider} found nothing for '{}'", query.address);
                        }
                        GeocodeError::RequestDenied { .. } => {
                            log::error!("{provider} denied request for '{}': {e}", query.address);
                        }
                        _ => log::warn!("{provider} failed for '{}': {e}", query.address),
                    }
                    unresolved.attempts.push((provider, e));
                }
            }
        }

        Err(unresolved)
    }
}

impl ChainLink {
    async fn attempt(&self, query: &GeocodeQuery) -> Result<GeocodedAddress, GeocodeError> {
        let mut retries = 0;
        loop {
            self.limiter.wait().await;
            match self.provider.geocode(query).await {
                Err(GeocodeError::RateLimited) if retries < self.policy.max_retries => {
                    retries += 1;
                    log::warn!(
                        "{} rate limited, waiting {:?} (retry {retries}/{})",
                        self.provider.provider(),
                        self.policy.backoff,
                        self.policy.max_retries,
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                result => return result,
            }
        }
    }
}
