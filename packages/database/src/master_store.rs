//! Master dataset CSV files.
//!
//! Each master is a CSV with a header row ([`IncidentRecord::CSV_COLUMNS`])
//! ordered by `reported_date` descending. Masters are replaced through
//! [`StagedWrite`]: the new content is written next to the target and only
//! renamed over it on [`StagedWrite::commit`], so a failed run never
//! leaves a half-written master behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use crime_log_source_models::IncidentRecord;

use crate::DbError;

/// Reads a master dataset.
///
/// A missing file is an empty master (first run). A file that exists but
/// cannot be parsed is an error.
///
/// # Errors
///
/// Returns [`DbError::Csv`] if any row is malformed.
pub fn read_master(path: &Path) -> Result<Vec<IncidentRecord>, DbError> {
    if !path.exists() {
        log::warn!("{} does not exist yet, starting empty", path.display());
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| DbError::csv(path, e))?;
    let mut records = Vec::new();
    for result in reader.deserialize::<IncidentRecord>() {
        records.push(result.map_err(|e| DbError::csv(path, e))?);
    }

    log::debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Latest `reported_at` among `records`.
#[must_use]
pub fn max_reported_at(records: &[IncidentRecord]) -> Option<NaiveDateTime> {
    records.iter().map(|r| r.reported_at).max()
}

/// Writes `records` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`DbError`] if the directory or file cannot be written.
pub fn write_records(path: &Path, records: &[IncidentRecord]) -> Result<(), DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent).map_err(|e| DbError::io(parent, e))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| DbError::csv(path, e))?;

    writer
        .write_record(IncidentRecord::CSV_COLUMNS)
        .map_err(|e| DbError::csv(path, e))?;
    for record in records {
        writer.serialize(record).map_err(|e| DbError::csv(path, e))?;
    }
    writer.flush().map_err(|e| DbError::io(path, e))?;

    Ok(())
}

/// Copies the current master to `archive` before it is replaced.
///
/// Returns `false` when there is no master to archive yet.
///
/// # Errors
///
/// Returns [`DbError::Io`] if the copy fails.
pub fn archive_master(master: &Path, archive: &Path) -> Result<bool, DbError> {
    if !master.exists() {
        return Ok(false);
    }

    if let Some(parent) = archive.parent() {
        crate::paths::ensure_dir(parent).map_err(|e| DbError::io(parent, e))?;
    }
    std::fs::copy(master, archive).map_err(|e| DbError::io(archive, e))?;

    log::info!("Archived {} to {}", master.display(), archive.display());
    Ok(true)
}

/// A fully written replacement for a file, not yet moved into place.
///
/// Dropping an uncommitted write removes the staged file.
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    staged: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Writes `records` to a sibling of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the staged file cannot be written.
    pub fn stage(target: &Path, records: &[IncidentRecord]) -> Result<Self, DbError> {
        let staged = staged_path(target);
        let write = Self {
            target: target.to_path_buf(),
            staged,
            committed: false,
        };
        write_records(&write.staged, records)?;
        Ok(write)
    }

    /// The file that [`Self::commit`] replaces.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staged file over the target.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the rename fails.
    pub fn commit(mut self) -> Result<(), DbError> {
        std::fs::rename(&self.staged, &self.target).map_err(|e| DbError::io(&self.target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed && self.staged.exists() {
            if let Err(e) = std::fs::remove_file(&self.staged) {
                log::warn!("Failed to remove {}: {e}", self.staged.display());
            }
        }
    }
}

/// Commits every staged write, in order.
///
/// Each existing target is set aside before its staged file is renamed
/// into place. If any step fails, targets already replaced are restored
/// from the set-aside copies, so either every target is replaced or none
/// is.
///
/// # Errors
///
/// Returns the first failure. Writes after it are discarded.
pub fn commit_all(writes: Vec<StagedWrite>) -> Result<(), DbError> {
    let mut done: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(writes.len());

    for write in writes {
        let target = write.target.clone();
        let previous = match set_aside(&target) {
            Ok(previous) => previous,
            Err(e) => {
                roll_back(&done);
                return Err(e);
            }
        };
        if let Err(e) = write.commit() {
            restore(&target, previous.as_deref());
            roll_back(&done);
            return Err(e);
        }
        done.push((target, previous));
    }

    for previous in done.iter().filter_map(|(_, previous)| previous.as_ref()) {
        if let Err(e) = std::fs::remove_file(previous) {
            log::warn!("Failed to remove {}: {e}", previous.display());
        }
    }
    Ok(())
}

fn set_aside(target: &Path) -> Result<Option<PathBuf>, DbError> {
    if !target.exists() {
        return Ok(None);
    }
    let previous = sibling_path(target, ".previous");
    std::fs::rename(target, &previous).map_err(|e| DbError::io(target, e))?;
    Ok(Some(previous))
}

fn restore(target: &Path, previous: Option<&Path>) {
    let result = match previous {
        Some(previous) => std::fs::rename(previous, target),
        None if target.exists() => std::fs::remove_file(target),
        None => Ok(()),
    };
    if let Err(e) = result {
        log::error!("Failed to restore {}: {e}", target.display());
    }
}

fn roll_back(done: &[(PathBuf, Option<PathBuf>)]) {
    for (target, previous) in done.iter().rev() {
        log::warn!("Rolling back {}", target.display());
        restore(target, previous.as_deref());
    }
}

fn staged_path(target: &Path) -> PathBuf {
    sibling_path(target, ".staged")
}

fn sibling_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(|| OsString::from("master"), OsString::from);
    name.push(suffix);
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use crime_log_crime_models::OffenseCategory;
    use crime_log_source_models::timestamp;

    use super::*;

    fn record(case: &str, reported: &str, count: u32) -> IncidentRecord {
        let reported_at = timestamp::parse_source(reported).unwrap();
        IncidentRecord {
            case_number: case.into(),
            reported_at,
            offense_description: "Larceny, Other".into(),
            offense_category: OffenseCategory::Property,
            statute_description: Some("11-41-5".into()),
            location_raw: Some("123 MAIN & PINE".into()),
            location_normalized: Some("123 Main At Pine".into()),
            count,
            latitude: Some(41.8236),
            longitude: Some(-71.4222),
            neighborhood: None,
            city: Some("Providence".into()),
            hour: 13,
            minute: 45,
            day: 1,
            month: 5,
            year: 2021,
        }
    }

    #[test]
    fn missing_master_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let records = read_master(&tmp.path().join("pvd_crime_master.csv")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn write_then_read_preserves_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("master.csv");
        let mut no_coords = record("2021-00002", "2021-05-01T09:00:00.000", 0);
        no_coords.latitude = None;
        no_coords.longitude = None;
        no_coords.location_raw = None;
        no_coords.location_normalized = None;
        no_coords.statute_description = None;
        let records = vec![record("2021-00001", "2021-05-01T13:45:00.000", 1), no_coords];

        write_records(&path, &records).unwrap();
        assert_eq!(read_master(&path).unwrap(), records);
    }

    #[test]
    fn sub_millisecond_timestamps_keep_their_key() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("master.csv");
        let records = vec![record("2021-00001", "2021-05-01T13:45:00.123456", 1)];

        write_records(&path, &records).unwrap();
        let read = read_master(&path).unwrap();
        assert_eq!(read[0].dedup_key(), records[0].dedup_key());
        assert_eq!(max_reported_at(&read), max_reported_at(&records));
    }

    #[test]
    fn empty_master_keeps_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("master.csv");
        write_records(&path, &[]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("casenumber,reported_date,"));
        assert!(read_master(&path).unwrap().is_empty());
    }

    #[test]
    fn corrupt_master_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("master.csv");
        std::fs::write(&path, "casenumber,reported_date\nX,not-a-date\n").unwrap();
        assert!(matches!(read_master(&path), Err(DbError::Csv { .. })));
    }

    #[test]
    fn max_reported_at_of_records() {
        let records = vec![
            record("a", "2021-05-01T09:00:00.000", 1),
            record("b", "2021-05-03T09:00:00.000", 1),
            record("c", "2021-05-02T09:00:00.000", 1),
        ];
        assert_eq!(
            max_reported_at(&records),
            timestamp::parse_source("2021-05-03T09:00:00.000")
        );
        assert_eq!(max_reported_at(&[]), None);
    }

    #[test]
    fn archive_copies_existing_master() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("master.csv");
        let archive = tmp.path().join("master_archive/05_01_2021_master.csv");

        assert!(!archive_master(&master, &archive).unwrap());

        write_records(&master, &[record("a", "2021-05-01T09:00:00.000", 1)]).unwrap();
        assert!(archive_master(&master, &archive).unwrap());
        assert_eq!(
            std::fs::read_to_string(&master).unwrap(),
            std::fs::read_to_string(&archive).unwrap()
        );
    }

    #[test]
    fn staged_write_replaces_on_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("master.csv");
        write_records(&master, &[record("old", "2021-05-01T09:00:00.000", 1)]).unwrap();

        let staged =
            StagedWrite::stage(&master, &[record("new", "2021-05-02T09:00:00.000", 1)]).unwrap();
        assert_eq!(read_master(&master).unwrap()[0].case_number, "old");

        commit_all(vec![staged]).unwrap();
        assert_eq!(read_master(&master).unwrap()[0].case_number, "new");
        assert!(!tmp.path().join("master.csv.staged").exists());
    }

    #[test]
    fn dropped_stage_leaves_target_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let master = tmp.path().join("master.csv");
        write_records(&master, &[record("old", "2021-05-01T09:00:00.000", 1)]).unwrap();

        {
            let staged =
                StagedWrite::stage(&master, &[record("new", "2021-05-02T09:00:00.000", 1)])
                    .unwrap();
            assert_eq!(staged.target(), master.as_path());
            assert!(tmp.path().join("master.csv.staged").exists());
        }

        assert!(!tmp.path().join("master.csv.staged").exists());
        assert_eq!(read_master(&master).unwrap()[0].case_number, "old");
    }

    #[test]
    fn failed_commit_restores_earlier_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let offense = tmp.path().join("offense.csv");
        let no_offense = tmp.path().join("no_offense.csv");
        write_records(&offense, &[record("old", "2021-05-01T09:00:00.000", 1)]).unwrap();
        write_records(&no_offense, &[record("old", "2021-05-01T09:00:00.000", 0)]).unwrap();

        let first =
            StagedWrite::stage(&offense, &[record("new", "2021-05-02T09:00:00.000", 1)]).unwrap();
        let second =
            StagedWrite::stage(&no_offense, &[record("new", "2021-05-02T09:00:00.000", 0)])
                .unwrap();
        std::fs::remove_file(&second.staged).unwrap();

        assert!(matches!(
            commit_all(vec![first, second]),
            Err(DbError::Io { .. })
        ));
        assert_eq!(read_master(&offense).unwrap()[0].case_number, "old");
        assert_eq!(read_master(&no_offense).unwrap()[0].case_number, "old");
        assert!(!tmp.path().join("offense.csv.previous").exists());
        assert!(!tmp.path().join("no_offense.csv.previous").exists());
        assert!(!tmp.path().join("offense.csv.staged").exists());
    }

    #[test]
    fn commit_creates_missing_targets_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let offense = tmp.path().join("offense.csv");
        let no_offense = tmp.path().join("no_offense.csv");
        write_records(&offense, &[record("old", "2021-05-01T09:00:00.000", 1)]).unwrap();

        let staged = vec![
            StagedWrite::stage(&offense, &[record("new", "2021-05-02T09:00:00.000", 1)]).unwrap(),
            StagedWrite::stage(&no_offense, &[record("new", "2021-05-02T09:00:00.000", 0)])
                .unwrap(),
        ];
        commit_all(staged).unwrap();

        assert_eq!(read_master(&offense).unwrap()[0].case_number, "new");
        assert_eq!(read_master(&no_offense).unwrap()[0].case_number, "new");
        assert!(!tmp.path().join("offense.csv.previous").exists());
    }
}
