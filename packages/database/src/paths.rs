#![allow(clippy::module_name_repetitions)]
//! Canonical file paths under the crime log data directory.
//!
//! The data directory defaults to `data/` relative to the working
//! directory and can be moved with `CRIME_LOG_DATA_DIR`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CRIME_LOG_DATA_DIR";

/// Data directory used when [`DATA_DIR_ENV`] is unset.
pub const DEFAULT_DATA_DIR: &str = "data";

/// File name of the offense master dataset.
pub const OFFENSE_MASTER_FILE: &str = "pvd_crime_master.csv";

/// File name of the no-offense master dataset.
pub const NO_OFFENSE_MASTER_FILE: &str = "non_offenses_master.csv";

/// File name of the address cache database.
pub const ADDRESS_CACHE_FILE: &str = "address_cache.duckdb";

/// Locations of every persisted file, rooted at one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Paths rooted at `$CRIME_LOG_DATA_DIR`, or `data/` if unset.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var_os(DATA_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map_or_else(|| Self::new(DEFAULT_DATA_DIR), Self::new)
    }

    /// The data directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The address cache `DuckDB` file.
    #[must_use]
    pub fn address_cache_db(&self) -> PathBuf {
        self.root.join(ADDRESS_CACHE_FILE)
    }

    /// The offense master CSV.
    #[must_use]
    pub fn offense_master(&self) -> PathBuf {
        self.root.join(OFFENSE_MASTER_FILE)
    }

    /// The no-offense master CSV.
    #[must_use]
    pub fn no_offense_master(&self) -> PathBuf {
        self.root.join(NO_OFFENSE_MASTER_FILE)
    }

    /// Directory of per-run snapshots.
    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("crime_log_runs")
    }

    /// Directory of pre-merge master archives.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("master_archive")
    }

    /// `crime_log_runs/pvd_crime_<MM_DD_YYYY>.csv`
    #[must_use]
    pub fn offense_run_snapshot(&self, date: NaiveDate) -> PathBuf {
        self.runs_dir()
            .join(format!("pvd_crime_{}.csv", date_stamp(date)))
    }

    /// `crime_log_runs/pvd_non_offense_<MM_DD_YYYY>.csv`
    #[must_use]
    pub fn no_offense_run_snapshot(&self, date: NaiveDate) -> PathBuf {
        self.runs_dir()
            .join(format!("pvd_non_offense_{}.csv", date_stamp(date)))
    }

    /// `master_archive/<MM_DD_YYYY>_<file_name>`
    #[must_use]
    pub fn archive_path(&self, file_name: &str, date: NaiveDate) -> PathBuf {
        self.archive_dir()
            .join(format!("{}_{file_name}", date_stamp(date)))
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

/// Formats a date the way run snapshots and archives are named.
#[must_use]
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%m_%d_%Y").to_string()
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
