//! Address cache stored in `DuckDB`.
//!
//! Maps a normalized address to the coordinates a geocoder resolved it to.
//! Only successful resolutions are stored, so an address that failed in
//! one run is retried in the next. Keys are unique and the first
//! resolution of an address wins.

use std::collections::BTreeMap;
use std::path::Path;

use duckdb::Connection;

use crate::DbError;

/// A resolved address as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLocation {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Neighborhood, if the resolving provider reported one.
    pub neighborhood: Option<String>,
    /// City, if the resolving provider reported one.
    pub city: Option<String>,
    /// Who produced the entry (`"nominatim"`, `"google"`, `"openaddresses"`).
    pub provider: String,
}

/// A cache row: `(address_key, location)`.
pub type CacheEntry = (String, CachedLocation);

/// Opens (or creates) the address cache `DuckDB`.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent).map_err(|e| DbError::io(parent, e))?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Opens an in-memory cache with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS address_cache (
            address_key TEXT PRIMARY KEY,
            lat DOUBLE NOT NULL,
            lng DOUBLE NOT NULL,
            neighborhood TEXT,
            city TEXT,
            provider TEXT NOT NULL,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

/// Looks up cached locations for the given address keys.
///
/// Keys without an entry are absent from the returned map.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn cache_lookup(
    conn: &Connection,
    address_keys: &[String],
) -> Result<BTreeMap<String, CachedLocation>, DbError> {
    let mut hits = BTreeMap::new();

    if address_keys.is_empty() {
        return Ok(hits);
    }

    for chunk in address_keys.chunks(1000) {
        let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT address_key, lat, lng, neighborhood, city, provider
             FROM address_cache WHERE address_key IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;

        for (i, key) in chunk.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, key)?;
        }

        stmt.raw_execute()?;
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            hits.insert(
                key,
                CachedLocation {
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    neighborhood: row.get(3)?,
                    city: row.get(4)?,
                    provider: row.get(5)?,
                },
            );
        }
    }

    Ok(hits)
}

/// Inserts resolved addresses. Existing keys are left untouched.
///
/// Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn cache_insert(conn: &Connection, entries: &[CacheEntry]) -> Result<u64, DbError> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(
        "INSERT INTO address_cache (address_key, lat, lng, neighborhood, city, provider)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (address_key) DO NOTHING",
    )?;

    let mut inserted = 0u64;
    for (key, loc) in entries {
        let changed = stmt.execute(duckdb::params![
            key,
            loc.latitude,
            loc.longitude,
            loc.neighborhood.as_deref(),
            loc.city.as_deref(),
            loc.provider,
        ])?;
        inserted += changed as u64;
    }

    Ok(inserted)
}

/// Returns the number of cached addresses.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn entry_count(conn: &Connection) -> Result<u64, DbError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM address_cache")?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Returns `(provider, entry_count)` for every provider in the cache,
/// ordered by provider.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_by_provider(conn: &Connection) -> Result<Vec<(String, u64)>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT provider, COUNT(*) FROM address_cache GROUP BY provider ORDER BY provider",
    )?;
    let rows = stmt.query_map([], |row| {
        let provider: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        #[allow(clippy::cast_sign_loss)]
        Ok((provider, count as u64))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(provider: &str, lat: f64) -> CachedLocation {
        CachedLocation {
            latitude: lat,
            longitude: -71.41,
            neighborhood: Some("Downtown".into()),
            city: Some("Providence".into()),
            provider: provider.into(),
        }
    }

    #[test]
    fn lookup_returns_only_hits() {
        let conn = open_in_memory().unwrap();
        cache_insert(
            &conn,
            &[("123 Main St".into(), location("nominatim", 41.82))],
        )
        .unwrap();

        let hits = cache_lookup(&conn, &["123 Main St".into(), "9 Elm St".into()]).unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits["123 Main St"];
        assert!((hit.latitude - 41.82).abs() < 1e-9);
        assert_eq!(hit.neighborhood.as_deref(), Some("Downtown"));
        assert_eq!(hit.provider, "nominatim");
    }

    #[test]
    fn first_resolution_wins() {
        let conn = open_in_memory().unwrap();
        let first = cache_insert(&conn, &[("1 A St".into(), location("nominatim", 41.1))]).unwrap();
        let second = cache_insert(&conn, &[("1 A St".into(), location("google", 41.9))]).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let hits = cache_lookup(&conn, &["1 A St".into()]).unwrap();
        assert_eq!(hits["1 A St"].provider, "nominatim");
        assert!((hits["1 A St"].latitude - 41.1).abs() < 1e-9);
    }

    #[test]
    fn empty_inputs() {
        let conn = open_in_memory().unwrap();
        assert!(cache_lookup(&conn, &[]).unwrap().is_empty());
        assert_eq!(cache_insert(&conn, &[]).unwrap(), 0);
        assert_eq!(entry_count(&conn).unwrap(), 0);
    }

    #[test]
    fn lookup_spans_chunks() {
        let conn = open_in_memory().unwrap();
        let entries: Vec<CacheEntry> = (0..1500)
            .map(|i| (format!("{i} Main St"), location("openaddresses", 41.8)))
            .collect();
        assert_eq!(cache_insert(&conn, &entries).unwrap(), 1500);

        let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(cache_lookup(&conn, &keys).unwrap().len(), 1500);
    }

    #[test]
    fn counts_by_provider() {
        let conn = open_in_memory().unwrap();
        cache_insert(
            &conn,
            &[
                ("1 A St".into(), location("nominatim", 41.1)),
                ("2 B St".into(), location("google", 41.2)),
                ("3 C St".into(), location("nominatim", 41.3)),
            ],
        )
        .unwrap();

        assert_eq!(entry_count(&conn).unwrap(), 3);
        assert_eq!(
            count_by_provider(&conn).unwrap(),
            vec![("google".to_string(), 1), ("nominatim".to_string(), 2)]
        );
    }

    #[test]
    fn persists_across_connections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/address_cache.duckdb");
        {
            let conn = open(&path).unwrap();
            cache_insert(&conn, &[("1 A St".into(), location("google", 41.5))]).unwrap();
        }
        let conn = open(&path).unwrap();
        assert_eq!(cache_lookup(&conn, &["1 A St".into()]).unwrap().len(), 1);
    }
}
