//! Address resolution: cache first, then the geocoder chain.
//!
//! Every distinct normalized address is resolved at most once per run.
//! Cache hits never touch the network. Misses are geocoded concurrently,
//! successes are written back to the cache, and the coordinates are
//! applied to every record sharing the address. Failures are not cached,
//! so the next run retries them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crime_log_database::DbError;
use crime_log_database::geocode_cache::{self, CacheEntry, CachedLocation};
use crime_log_geocoder::chain::GeocoderChain;
use crime_log_geocoder::{GeocodeQuery, GeocodedAddress, GeocodingProvider};
use crime_log_source::progress::ProgressCallback;
use crime_log_source_models::{BoundingBox, IncidentRecord};
use duckdb::Connection;
use futures::stream::{self, StreamExt as _};

/// Default number of addresses geocoded concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How addresses are turned into geocoder queries.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Appended to each normalized address (e.g. `", Providence, RI"`).
    pub suffix: String,
    /// Area to bias results toward.
    pub bounds: Option<BoundingBox>,
    /// Maximum in-flight geocoding requests.
    pub concurrency: usize,
}

/// Counts from one resolution pass.
///
/// Address counts are per distinct normalized address, not per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Records with no usable location (never geocoded).
    pub records_without_location: u64,
    /// Distinct normalized addresses in the batch.
    pub distinct_addresses: u64,
    /// Addresses answered by the cache.
    pub from_cache: u64,
    /// Addresses resolved by each provider.
    pub by_provider: BTreeMap<GeocodingProvider, u64>,
    /// Addresses no provider could resolve.
    pub unresolved: u64,
    /// New cache entries written.
    pub cached: u64,
}

impl ResolveStats {
    /// Addresses resolved by any provider this run.
    #[must_use]
    pub fn geocoded(&self) -> u64 {
        self.by_provider.values().sum()
    }
}

/// Fills in coordinates for `records`.
///
/// Records whose address cannot be resolved are returned unchanged, with
/// null coordinates.
///
/// # Errors
///
/// Returns [`DbError`] if the cache cannot be read or written. Geocoding
/// failures are never errors.
pub async fn resolve_locations(
    mut records: Vec<IncidentRecord>,
    cache: &Connection,
    chain: &GeocoderChain,
    options: &ResolveOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<(Vec<IncidentRecord>, ResolveStats), DbError> {
    let mut stats = ResolveStats::default();

    let mut addresses = BTreeSet::new();
    for record in &records {
        match &record.location_normalized {
            Some(address) if !record.has_coordinates() => {
                addresses.insert(address.clone());
            }
            Some(_) => {}
            None => stats.records_without_location += 1,
        }
    }
    stats.distinct_addresses = addresses.len() as u64;

    // --- Phase 0: Cache lookup ---
    let keys: Vec<String> = addresses.into_iter().collect();
    let mut resolved = geocode_cache::cache_lookup(cache, &keys)?;
    stats.from_cache = resolved.len() as u64;

    let misses: Vec<String> = keys
        .into_iter()
        .filter(|k| !resolved.contains_key(k))
        .collect();

    log::info!(
        "Addresses: {} distinct, {} from cache, {} to geocode",
        stats.distinct_addresses,
        stats.from_cache,
        misses.len()
    );

    // --- Phase 1: Geocode misses ---
    let found = if misses.is_empty() {
        BTreeMap::new()
    } else if chain.is_empty() {
        log::warn!(
            "No geocoding providers configured, {} addresses left unresolved",
            misses.len()
        );
        BTreeMap::new()
    } else {
        geocode_addresses(chain, &misses, options, progress).await
    };

    stats.unresolved = (misses.len() - found.len()) as u64;

    // --- Phase 2: Cache successes ---
    let entries: Vec<CacheEntry> = found
        .iter()
        .map(|(key, geocoded)| {
            *stats.by_provider.entry(geocoded.provider).or_default() += 1;
            (key.clone(), cached_location(geocoded))
        })
        .collect();
    if !entries.is_empty() {
        log::info!("Writing {} entries to address cache...", entries.len());
        stats.cached = geocode_cache::cache_insert(cache, &entries)?;
    }
    resolved.extend(entries);

    // --- Phase 3: Apply ---
    for record in &mut records {
        if record.has_coordinates() {
            continue;
        }
        let Some(location) = record
            .location_normalized
            .as_ref()
            .and_then(|k| resolved.get(k))
        else {
            continue;
        };
        record.latitude = Some(location.latitude);
        record.longitude = Some(location.longitude);
        if record.neighborhood.is_none() {
            record.neighborhood.clone_from(&location.neighborhood);
        }
        if record.city.is_none() {
            record.city.clone_from(&location.city);
        }
    }

    Ok((records, stats))
}

/// Sends each address through the chain with bounded concurrency.
///
/// Returns only the addresses that resolved.
async fn geocode_addresses(
    chain: &GeocoderChain,
    addresses: &[String],
    options: &ResolveOptions,
    progress: Arc<dyn ProgressCallback>,
) -> BTreeMap<String, GeocodedAddress> {
    let concurrency = options.concurrency.max(1);
    log::info!(
        "Geocoding {} addresses (concurrency={concurrency})...",
        addresses.len()
    );
    progress.set_total(addresses.len() as u64);

    let results: Vec<_> = stream::iter(addresses.iter().map(|address| {
        let progress = Arc::clone(&progress);
        async move {
            let query = GeocodeQuery::with_suffix(address, &options.suffix, options.bounds);
            progress.set_message(format!("Geocoding {}", query.address));
            let result = chain.resolve(&query).await;
            progress.inc(1);
            (address.clone(), result)
        }
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    let mut found = BTreeMap::new();
    for (address, result) in results {
        match result {
            Ok(geocoded) => {
                found.insert(address, geocoded);
            }
            Err(unresolved) => {
                log::warn!("Could not resolve '{address}': {unresolved}");
            }
        }
    }

    progress.finish(format!(
        "Geocoded {}/{} addresses",
        found.len(),
        addresses.len()
    ));
    found
}

fn cached_location(geocoded: &GeocodedAddress) -> CachedLocation {
    CachedLocation {
        latitude: geocoded.latitude,
        longitude: geocoded.longitude,
        neighborhood: geocoded.neighborhood.clone(),
        city: geocoded.city.clone(),
        provider: geocoded.provider.to_string(),
    }
}
