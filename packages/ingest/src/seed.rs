//! Seeding the address cache from an `OpenAddresses` CSV.
//!
//! Each row's `NUMBER` and `STREET` are joined and normalized the same way
//! incident locations are, so seeded entries are hit by the resolver
//! without any geocoding.

use std::path::Path;

use crime_log_database::DbError;
use crime_log_database::geocode_cache::{self, CacheEntry, CachedLocation};
use crime_log_source::address::normalize_location;
use crime_log_source_models::BoundingBox;
use duckdb::Connection;
use serde::Deserialize;

/// Provider name recorded for seeded cache entries.
pub const SEED_PROVIDER: &str = "openaddresses";

const INSERT_BATCH: usize = 10_000;

/// A raw record from an `OpenAddresses` CSV file.
#[derive(Debug, Deserialize)]
struct OaRecord {
    #[serde(rename = "LON")]
    lon: f64,
    #[serde(rename = "LAT")]
    lat: f64,
    #[serde(rename = "NUMBER", default)]
    number: String,
    #[serde(rename = "STREET", default)]
    street: String,
    #[serde(rename = "CITY", default)]
    city: Option<String>,
}

impl OaRecord {
    fn to_entry(&self, bounds: Option<&BoundingBox>) -> Option<CacheEntry> {
        let number = self.number.trim();
        let street = self.street.trim();
        if number.is_empty() || street.is_empty() {
            return None;
        }
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return None;
        }
        if bounds.is_some_and(|b| !b.contains(self.lat, self.lon)) {
            return None;
        }

        let key = normalize_location(&format!("{number} {street}"))?;
        let city = self
            .city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(crime_log_source::address::title_case);

        Some((
            key,
            CachedLocation {
                latitude: self.lat,
                longitude: self.lon,
                neighborhood: None,
                city,
                provider: SEED_PROVIDER.to_string(),
            },
        ))
    }
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedStats {
    /// Rows read from the CSV.
    pub rows: u64,
    /// Rows skipped as malformed, incomplete, or out of bounds.
    pub skipped: u64,
    /// New cache entries. Addresses already cached are left as they were.
    pub inserted: u64,
}

/// Loads `path` into the address cache.
///
/// Rows outside `bounds` are skipped.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened or the cache write
/// fails. Malformed rows are skipped, not errors.
pub fn seed_from_openaddresses(
    cache: &Connection,
    path: &Path,
    bounds: Option<&BoundingBox>,
) -> Result<SeedStats, DbError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| DbError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

    let mut stats = SeedStats::default();
    let mut pending: Vec<CacheEntry> = Vec::with_capacity(INSERT_BATCH);

    for result in reader.deserialize::<OaRecord>() {
        stats.rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                stats.skipped += 1;
                continue;
            }
        };

        let Some(entry) = record.to_entry(bounds) else {
            stats.skipped += 1;
            continue;
        };
        pending.push(entry);

        if pending.len() >= INSERT_BATCH {
            stats.inserted += geocode_cache::cache_insert(cache, &pending)?;
            pending.clear();
            log::info!("  {} rows read, {} cached so far...", stats.rows, stats.inserted);
        }
    }

    stats.inserted += geocode_cache::cache_insert(cache, &pending)?;

    log::info!(
        "Seeded {} addresses from {} ({} rows, {} skipped)",
        stats.inserted,
        path.display(),
        stats.rows,
        stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn providence() -> BoundingBox {
        BoundingBox {
            south: 41.70,
            west: -71.65,
            north: 42.0,
            east: -71.25,
        }
    }

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn seeds_normalized_addresses() {
        let file = csv_file(
            "LON,LAT,NUMBER,STREET,UNIT,CITY\n\
             -71.4128,41.8240,123,MAIN ST,,PROVIDENCE\n\
             -71.4000,41.8100,9,ELM  ST,,\n",
        );
        let cache = geocode_cache::open_in_memory().unwrap();

        let stats = seed_from_openaddresses(&cache, file.path(), Some(&providence())).unwrap();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.inserted, 2);

        let hits =
            geocode_cache::cache_lookup(&cache, &["123 Main St".into(), "9 Elm St".into()])
                .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits["123 Main St"].provider, SEED_PROVIDER);
        assert_eq!(hits["123 Main St"].city.as_deref(), Some("Providence"));
        assert!(hits["9 Elm St"].city.is_none());
    }

    #[test]
    fn skips_incomplete_and_out_of_bounds_rows() {
        let file = csv_file(
            "LON,LAT,NUMBER,STREET\n\
             -71.4128,41.8240,,MAIN ST\n\
             -74.0060,40.7128,1,BROADWAY\n\
             not-a-number,41.8,5,PINE ST\n\
             -71.4128,41.8240,7,PINE ST\n",
        );
        let cache = geocode_cache::open_in_memory().unwrap();

        let stats = seed_from_openaddresses(&cache, file.path(), Some(&providence())).unwrap();
        assert_eq!(stats.rows, 4);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.inserted, 1);
    }

    #[test]
    fn existing_entries_are_kept() {
        let file = csv_file("LON,LAT,NUMBER,STREET\n-71.4,41.8,1,A ST\n");
        let cache = geocode_cache::open_in_memory().unwrap();
        geocode_cache::cache_insert(
            &cache,
            &[(
                "1 A St".into(),
                CachedLocation {
                    latitude: 41.5,
                    longitude: -71.5,
                    neighborhood: None,
                    city: None,
                    provider: "google".into(),
                },
            )],
        )
        .unwrap();

        let stats = seed_from_openaddresses(&cache, file.path(), None).unwrap();
        assert_eq!(stats.inserted, 0);
        let hits = geocode_cache::cache_lookup(&cache, &["1 A St".into()]).unwrap();
        assert_eq!(hits["1 A St"].provider, "google");
    }

    #[test]
    fn missing_file_is_an_error() {
        let cache = geocode_cache::open_in_memory().unwrap();
        let result = seed_from_openaddresses(&cache, Path::new("/nonexistent/oa.csv"), None);
        assert!(matches!(result, Err(DbError::Csv { .. })));
    }
}
