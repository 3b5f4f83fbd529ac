#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the case log ingestion tool.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use crime_log_cli_utils::IndicatifProgress;
use crime_log_database::geocode_cache;
use crime_log_database::paths::DataPaths;
use crime_log_geocoder::service_registry::{all_services, build_chain, enabled_services};
use crime_log_ingest::resolve::DEFAULT_CONCURRENCY;
use crime_log_ingest::seed::seed_from_openaddresses;
use crime_log_ingest::{RunOptions, cache_stats, run_pipeline};
use crime_log_source::registry::{all_sources, find_source};
use crime_log_source::source_def::{SourceDefinition, load_source_file};

const DEFAULT_SOURCE: &str = "providence";

#[derive(Parser)]
#[command(name = "crime_log_ingest", about = "Case log ingestion tool")]
struct Cli {
    /// Directory holding the masters, snapshots and address cache.
    /// Defaults to `$CRIME_LOG_DATA_DIR`, then `./data`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new records and merge them into the masters (the default)
    Run {
        /// Source identifier from the built-in registry
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
        /// Load the source definition from a TOML file instead
        #[arg(long, conflicts_with = "source")]
        source_config: Option<PathBuf>,
        /// Maximum concurrent geocoding requests
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
    /// List the built-in case log sources
    Sources,
    /// List the geocoding services in fallback order
    Services,
    /// Load an `OpenAddresses` CSV into the address cache
    SeedCache {
        /// Path to the `OpenAddresses` CSV
        path: PathBuf,
        /// Source whose bounds filter the rows
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
        /// Keep rows outside the source's bounds
        #[arg(long)]
        no_bounds: bool,
    },
    /// Show address cache entry counts per provider
    CacheStats,
}

fn load_definition(
    source: &str,
    source_config: Option<&Path>,
) -> Result<SourceDefinition, Box<dyn std::error::Error>> {
    if let Some(path) = source_config {
        return Ok(load_source_file(path)?);
    }
    find_source(source).ok_or_else(|| format!("Unknown source: {source}").into())
}

async fn run(
    data: &DataPaths,
    source: &str,
    source_config: Option<&Path>,
    concurrency: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let multi = crime_log_cli_utils::init_logger();

    let definition = load_definition(source, source_config)?;
    let fetcher = definition.build_source()?;
    let chain = build_chain(&enabled_services())?;
    if chain.is_empty() {
        log::warn!("No geocoding services available, only cached addresses will resolve");
    }

    log::info!("Ingesting {} into {}", definition.name, data.root().display());

    let options = RunOptions {
        concurrency: concurrency.max(1),
        ..RunOptions::default()
    };
    let progress = IndicatifProgress::batch_bar(&multi, "Resolving addresses");

    let start = Instant::now();
    let summary = run_pipeline(
        fetcher.as_ref(),
        &definition,
        &chain,
        data,
        &options,
        progress,
    )
    .await?;

    println!("{summary}");
    log::info!("Run complete in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let data = cli.data_dir.map_or_else(DataPaths::from_env, DataPaths::new);

    let Some(command) = cli.command else {
        return run(&data, DEFAULT_SOURCE, None, DEFAULT_CONCURRENCY).await;
    };

    match command {
        Commands::Run {
            source,
            source_config,
            concurrency,
        } => {
            run(&data, &source, source_config.as_deref(), concurrency).await?;
        }
        Commands::Sources => {
            let sources = all_sources();
            println!("{:<20} NAME", "ID");
            println!("{}", "-".repeat(50));
            for source in &sources {
                println!("{:<20} {}", source.id, source.name);
            }
        }
        Commands::Services => {
            let services = all_services();
            println!(
                "{:<12} {:<8} {:<8} {:>10} NAME",
                "ID", "PRIORITY", "ENABLED", "RATE (ms)"
            );
            println!("{}", "-".repeat(60));
            for service in &services {
                println!(
                    "{:<12} {:<8} {:<8} {:>10} {}",
                    service.id,
                    service.priority,
                    service.enabled,
                    service.rate_limit_ms,
                    service.name
                );
            }
        }
        Commands::SeedCache {
            path,
            source,
            no_bounds,
        } => {
            let _multi = crime_log_cli_utils::init_logger();
            let definition = load_definition(&source, None)?;
            let bounds = if no_bounds { None } else { definition.bounds };

            let cache = geocode_cache::open(&data.address_cache_db())?;
            let start = Instant::now();
            let stats = seed_from_openaddresses(&cache, &path, bounds.as_ref())?;
            log::info!(
                "Seeding complete: {} new addresses in {:.1}s",
                stats.inserted,
                start.elapsed().as_secs_f64()
            );
        }
        Commands::CacheStats => {
            let cache = geocode_cache::open(&data.address_cache_db())?;
            let stats = cache_stats(&cache)?;
            let total: u64 = stats.iter().map(|(_, n)| n).sum();
            println!("{:<16} ENTRIES", "PROVIDER");
            println!("{}", "-".repeat(30));
            for (provider, n) in &stats {
                println!("{provider:<16} {n}");
            }
            println!("{:<16} {total}", "total");
        }
    }

    Ok(())
}
