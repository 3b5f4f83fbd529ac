#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incremental ingestion of the case log into the master datasets.
//!
//! One run fetches everything newer than the masters, normalizes it,
//! resolves addresses (cache, then geocoders), writes per-run snapshots,
//! and merges the new records into the offense and no-offense masters.

pub mod reconcile;
pub mod resolve;
pub mod seed;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use crime_log_database::paths::{self, DataPaths};
use crime_log_database::{DbError, geocode_cache, master_store};
use crime_log_geocoder::GeocodingProvider;
use crime_log_geocoder::chain::GeocoderChain;
use crime_log_source::normalize::{normalize_batch, split_by_count};
use crime_log_source::progress::ProgressCallback;
use crime_log_source::source_def::SourceDefinition;
use crime_log_source::{IncidentSource, SourceError};
use crime_log_source_models::{IncidentRecord, timestamp};

use crate::reconcile::reconcile;
use crate::resolve::{ResolveOptions, ResolveStats, resolve_locations};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Fetching from the case log failed.
    #[error("Fetch failed: {0}")]
    Source(#[from] SourceError),

    /// Reading or writing a master, snapshot or the cache failed.
    #[error("Storage failed: {0}")]
    Db(#[from] DbError),

    /// Building the geocoder chain failed.
    #[error("Geocoder setup failed: {0}")]
    Geocode(#[from] crime_log_geocoder::GeocodeError),
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum in-flight geocoding requests.
    pub concurrency: usize,
    /// Date used to name snapshots and archives.
    pub today: NaiveDate,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: resolve::DEFAULT_CONCURRENCY,
            today: chrono::Local::now().date_naive(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Fetch lower bound (exclusive). `None` on a first run.
    pub since: Option<NaiveDateTime>,
    /// Raw records returned by the source.
    pub fetched: u64,
    /// Records dropped during normalization, by reason.
    pub dropped: BTreeMap<&'static str, u64>,
    /// New offense records (`count > 0`).
    pub offense: u64,
    /// New no-offense records (`count == 0`).
    pub no_offense: u64,
    /// Address resolution counts.
    pub resolve: ResolveStats,
    /// Whether the masters were rewritten.
    pub masters_updated: bool,
    /// Offense master size after the run.
    pub offense_master_total: u64,
    /// No-offense master size after the run.
    pub no_offense_master_total: u64,
}

impl RunSummary {
    /// Total dropped records.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let since = self
            .since
            .as_ref()
            .map_or_else(|| "beginning".to_string(), timestamp::format);
        writeln!(f, "Fetched:        {} (since {since})", self.fetched)?;
        write!(f, "Dropped:        {}", self.dropped_total())?;
        if !self.dropped.is_empty() {
            let reasons: Vec<String> = self
                .dropped
                .iter()
                .map(|(reason, n)| format!("{reason}={n}"))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        writeln!(f)?;
        writeln!(f, "Offenses:       {}", self.offense)?;
        writeln!(f, "No-offense:     {}", self.no_offense)?;
        writeln!(
            f,
            "Addresses:      {} distinct, {} cached, {} geocoded, {} unresolved",
            self.resolve.distinct_addresses,
            self.resolve.from_cache,
            self.resolve.geocoded(),
            self.resolve.unresolved
        )?;
        for (provider, n) in &self.resolve.by_provider {
            writeln!(f, "  via {provider}: {n}")?;
        }
        if self.masters_updated {
            write!(
                f,
                "Masters:        updated ({} offense, {} no-offense)",
                self.offense_master_total, self.no_offense_master_total
            )
        } else {
            write!(f, "Masters:        unchanged")
        }
    }
}

/// Latest `reported_at` already stored: the offense master's maximum, or
/// the no-offense master's when the offense master is empty.
#[must_use]
pub fn fetch_boundary(
    offense_master: &[IncidentRecord],
    no_offense_master: &[IncidentRecord],
) -> Option<NaiveDateTime> {
    master_store::max_reported_at(offense_master)
        .or_else(|| master_store::max_reported_at(no_offense_master))
}

/// Runs one ingestion pass.
///
/// Nothing under `data` is modified unless the fetch succeeds and
/// returns records. Both masters are staged before either is replaced.
///
/// # Errors
///
/// Returns [`IngestError`] if the fetch fails or any master, snapshot or
/// cache file cannot be read or written.
pub async fn run_pipeline(
    source: &dyn IncidentSource,
    definition: &SourceDefinition,
    chain: &GeocoderChain,
    data: &DataPaths,
    options: &RunOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<RunSummary, IngestError> {
    let mut summary = RunSummary::default();

    // --- Read masters ---
    let offense_path = data.offense_master();
    let no_offense_path = data.no_offense_master();
    let offense_master = master_store::read_master(&offense_path)?;
    let no_offense_master = master_store::read_master(&no_offense_path)?;
    summary.since = fetch_boundary(&offense_master, &no_offense_master);

    // --- Fetch ---
    log::info!(
        "Fetching {} records after {}...",
        source.id(),
        summary
            .since
            .as_ref()
            .map_or_else(|| "the beginning".to_string(), timestamp::format)
    );
    let raws = source.fetch_new(summary.since).await?;
    summary.fetched = raws.len() as u64;

    if raws.is_empty() {
        log::info!("No new records, masters left unchanged");
        summary.offense_master_total = offense_master.len() as u64;
        summary.no_offense_master_total = no_offense_master.len() as u64;
        return Ok(summary);
    }
    log::info!("Fetched {} records", raws.len());

    // --- Normalize ---
    let batch = normalize_batch(&raws, &definition.taxonomy);
    summary.dropped = batch.dropped_by_reason();
    if !batch.dropped.is_empty() {
        log::warn!("Dropped {} malformed records", batch.dropped.len());
    }

    // --- Resolve ---
    let cache = geocode_cache::open(&data.address_cache_db())?;
    let resolve_options = ResolveOptions {
        suffix: definition.city_state_suffix(),
        bounds: definition.bounds,
        concurrency: options.concurrency,
    };
    let (records, resolve_stats) =
        resolve_locations(batch.records, &cache, chain, &resolve_options, progress).await?;
    summary.resolve = resolve_stats;

    let (offense, no_offense) = split_by_count(records);
    summary.offense = offense.len() as u64;
    summary.no_offense = no_offense.len() as u64;
    log::info!(
        "{} offense records, {} no-offense records",
        offense.len(),
        no_offense.len()
    );

    // --- Snapshots ---
    master_store::write_records(&data.offense_run_snapshot(options.today), &offense)?;
    master_store::write_records(&data.no_offense_run_snapshot(options.today), &no_offense)?;

    // --- Reconcile ---
    master_store::archive_master(
        &offense_path,
        &data.archive_path(paths::OFFENSE_MASTER_FILE, options.today),
    )?;
    master_store::archive_master(
        &no_offense_path,
        &data.archive_path(paths::NO_OFFENSE_MASTER_FILE, options.today),
    )?;

    let offense_master = reconcile(offense_master, offense);
    let no_offense_master = reconcile(no_offense_master, no_offense);

    let staged = vec![
        master_store::StagedWrite::stage(&offense_path, &offense_master)?,
        master_store::StagedWrite::stage(&no_offense_path, &no_offense_master)?,
    ];
    master_store::commit_all(staged)?;

    summary.masters_updated = true;
    summary.offense_master_total = offense_master.len() as u64;
    summary.no_offense_master_total = no_offense_master.len() as u64;
    log::info!(
        "Masters updated: {} offense, {} no-offense",
        offense_master.len(),
        no_offense_master.len()
    );

    Ok(summary)
}

/// Per-provider cache entry counts, including providers with none.
///
/// # Errors
///
/// Returns [`DbError`] if the cache cannot be queried.
pub fn cache_stats(cache: &duckdb::Connection) -> Result<Vec<(String, u64)>, DbError> {
    let mut counts: BTreeMap<String, u64> =
        [GeocodingProvider::Nominatim, GeocodingProvider::Google]
            .iter()
            .map(|p| (p.to_string(), 0))
            .collect();
    counts.insert(seed::SEED_PROVIDER.to_string(), 0);
    for (provider, n) in geocode_cache::count_by_provider(cache)? {
        counts.insert(provider, n);
    }
    Ok(counts.into_iter().collect())
}
