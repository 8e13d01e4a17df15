//! Ingestion of CI result JSON files and the one-time log migration.
//!
//! The build farm drops one JSON file per run into a data directory, with log
//! output in sibling files referenced by name. Migration externalizes that
//! log text into the `task_logs` table, replacing each file reference with a
//! generated id, then inserts the records themselves.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::report::{RunRecord, WeeklyBuildRecord};
use crate::storage::{self, Pool};

/// Subdirectory layout inside the data directory.
pub const NIGHTLY_DIR: &str = "nightly-tests";
pub const WEEKLY_DIR: &str = "weekly-builds";
pub const LOGS_DIR: &str = "logs";

/// Read every `*.json` file in a directory into records.
///
/// A file that cannot be read or parsed is logged and skipped; one bad
/// record never aborts the run. Only a missing/unreadable directory is an
/// error.
pub fn read_dir_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Unable to scan directory {}", dir.display()))?;

    let mut records = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        match serde_json::from_str(&data) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unparseable file");
            }
        }
    }

    Ok(records)
}

/// Counts reported by [`migrate`].
#[derive(Debug, Default)]
pub struct MigrationSummary {
    pub nightly: usize,
    pub weekly: usize,
    pub logs: usize,
}

/// Replace an inline log file reference with a stored log id.
///
/// Returns the new reference, or `None` (clearing the field) when the log
/// file itself is missing -- a dangling reference would 404 forever.
fn externalize_log(pool: &Pool, logs_dir: &Path, reference: &str) -> Result<Option<String>> {
    let path = logs_dir.join(reference);
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Referenced log file missing");
            return Ok(None);
        }
    };

    let id = Uuid::new_v4().to_string();
    storage::insert_log(pool, &id, &content)?;
    Ok(Some(id))
}

fn rewrite_log_field(
    pool: &Pool,
    logs_dir: &Path,
    field: &mut Option<String>,
    count: &mut usize,
) -> Result<()> {
    if let Some(reference) = field.take() {
        *field = externalize_log(pool, logs_dir, &reference)?;
        if field.is_some() {
            *count += 1;
        }
    }
    Ok(())
}

/// One-time migration: read the JSON data directory, externalize log text,
/// and load everything into the database.
pub fn migrate(pool: &Pool, data_dir: &Path) -> Result<MigrationSummary> {
    let logs_dir = data_dir.join(LOGS_DIR);
    let mut summary = MigrationSummary::default();

    let mut nightly: Vec<RunRecord> = read_dir_records(&data_dir.join(NIGHTLY_DIR))?;
    for record in &mut nightly {
        rewrite_log_field(pool, &logs_dir, &mut record.build.build_log, &mut summary.logs)?;
        if let Some(tests) = record.test_results.as_mut() {
            rewrite_log_field(pool, &logs_dir, &mut tests.log, &mut summary.logs)?;
        }
        for platform in &mut record.cross_platform_build_results {
            rewrite_log_field(pool, &logs_dir, &mut platform.build.build_log, &mut summary.logs)?;
        }

        storage::insert_nightly(pool, record)?;
        summary.nightly += 1;
    }

    let mut weekly: Vec<WeeklyBuildRecord> = read_dir_records(&data_dir.join(WEEKLY_DIR))?;
    for record in &mut weekly {
        let project = record.project_key().to_string();
        for result in &mut record.results {
            rewrite_log_field(pool, &logs_dir, &mut result.log, &mut summary.logs)?;
            // The weekly sweep doubles as the preset catalog.
            storage::add_preset(pool, &project, &result.preset)?;
        }

        storage::insert_weekly(pool, record)?;
        summary.weekly += 1;
    }

    tracing::info!(
        nightly = summary.nightly,
        weekly = summary.weekly,
        logs = summary.logs,
        "Migration complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(NIGHTLY_DIR)).unwrap();
        fs::create_dir_all(dir.path().join(WEEKLY_DIR)).unwrap();
        fs::create_dir_all(dir.path().join(LOGS_DIR)).unwrap();

        let db = dir.path().join("test.db");
        let pool = storage::open_pool(db.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    #[test]
    fn test_bad_file_is_skipped() {
        let (dir, _pool) = setup();
        let nightly = dir.path().join(NIGHTLY_DIR);
        fs::write(nightly.join("good.json"), r#"{"Project": "Alpha"}"#).unwrap();
        fs::write(nightly.join("bad.json"), "not json at all").unwrap();
        fs::write(nightly.join("ignored.txt"), "not a json file").unwrap();

        let records: Vec<RunRecord> = read_dir_records(&nightly).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].project_key(), "Alpha");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res: Result<Vec<RunRecord>> = read_dir_records(&dir.path().join("nope"));
        assert!(res.is_err());
    }

    #[test]
    fn test_migrate_round_trips_log_content() {
        let (dir, pool) = setup();
        let content = "compiling...\nwarning: unused variable\ndone\n";
        fs::write(dir.path().join(LOGS_DIR).join("build-7.log"), content).unwrap();
        fs::write(
            dir.path().join(NIGHTLY_DIR).join("run.json"),
            r#"{"Project": "Alpha", "TimeStamp": "2024-05-01T03:00:00Z",
                "BuildSuccess": true, "BuildLog": "build-7.log"}"#,
        )
        .unwrap();

        let summary = migrate(&pool, dir.path()).unwrap();
        assert_eq!(summary.nightly, 1);
        assert_eq!(summary.logs, 1);

        let stored = storage::nightly_page(&pool, "Alpha", 1).unwrap();
        let id = stored[0].build.build_log.as_deref().unwrap();
        assert_ne!(id, "build-7.log");
        assert_eq!(storage::get_log(&pool, id).unwrap().as_deref(), Some(content));
    }

    #[test]
    fn test_migrate_clears_dangling_log_reference() {
        let (dir, pool) = setup();
        fs::write(
            dir.path().join(NIGHTLY_DIR).join("run.json"),
            r#"{"Project": "Alpha", "BuildSuccess": false, "BuildLog": "gone.log"}"#,
        )
        .unwrap();

        migrate(&pool, dir.path()).unwrap();
        let stored = storage::nightly_page(&pool, "Alpha", 1).unwrap();
        assert!(stored[0].build.build_log.is_none());
    }

    #[test]
    fn test_migrate_registers_weekly_presets() {
        let (dir, pool) = setup();
        fs::write(
            dir.path().join(WEEKLY_DIR).join("sweep.json"),
            r#"{"Project": "Alpha", "TimeStamp": "2024-05-05T03:00:00Z",
                "Results": [
                    {"Preset": "Windows", "Success": true},
                    {"Preset": "Android", "Success": false}
                ]}"#,
        )
        .unwrap();

        migrate(&pool, dir.path()).unwrap();
        let presets = storage::list_presets(&pool).unwrap();
        assert_eq!(presets[0].0, "Alpha");
        assert_eq!(presets[0].1, vec!["Android".to_string(), "Windows".to_string()]);
    }
}
