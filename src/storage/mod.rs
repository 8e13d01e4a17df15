//! SQLite storage layer -- schema, queries, migrations.
//!
//! Result records are stored as their original JSON alongside extracted
//! project/timestamp columns so pagination and grouping stay in SQL while the
//! record shape stays authoritative.

pub mod schema;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::report::{ProjectRecord, RunRecord, WeeklyBuildRecord};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Results per page served by the paginated report endpoints.
pub const PAGE_SIZE: u32 = 25;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

fn insert_record<T: ProjectRecord + Serialize>(pool: &Pool, table: &str, record: &T) -> Result<()> {
    let conn = pool.get()?;
    let json = serde_json::to_string(record)?;
    // Missing timestamps become NULL, which sorts after every real instant
    // in the DESC queries below.
    let ts = record.sort_timestamp();
    let time_stamp = if ts == chrono::DateTime::<chrono::Utc>::MIN_UTC {
        None
    } else {
        Some(ts.to_rfc3339())
    };

    conn.execute(
        &format!(
            "INSERT INTO {} (project, time_stamp, record_json) VALUES (?1, ?2, ?3)",
            table
        ),
        params![record.project_key(), time_stamp, json],
    )
    .with_context(|| format!("Failed to insert into {}", table))?;

    Ok(())
}

/// Save one nightly run record.
pub fn insert_nightly(pool: &Pool, record: &RunRecord) -> Result<()> {
    insert_record(pool, "nightly_results", record)
}

/// Save one weekly build record.
pub fn insert_weekly(pool: &Pool, record: &WeeklyBuildRecord) -> Result<()> {
    insert_record(pool, "weekly_results", record)
}

fn fetch_page<T: DeserializeOwned>(
    pool: &Pool,
    table: &str,
    project: &str,
    page: u32,
) -> Result<Vec<T>> {
    let conn = pool.get()?;
    let page = page.max(1);
    let offset = (page - 1) * PAGE_SIZE;

    let mut stmt = conn.prepare(&format!(
        "SELECT record_json FROM {}
         WHERE project = ?1
         ORDER BY time_stamp DESC
         LIMIT ?2 OFFSET ?3",
        table
    ))?;

    let rows = stmt.query_map(params![project, PAGE_SIZE, offset], |row| {
        row.get::<_, String>(0)
    })?;

    let mut records = Vec::new();
    for json in rows {
        let json = json?;
        match serde_json::from_str(&json) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(table, error = %e, "Skipping unreadable stored record"),
        }
    }
    Ok(records)
}

/// Fetch one page of a project's nightly records, newest first.
pub fn nightly_page(pool: &Pool, project: &str, page: u32) -> Result<Vec<RunRecord>> {
    fetch_page(pool, "nightly_results", project, page)
}

/// Fetch one page of a project's weekly records, newest first.
pub fn weekly_page(pool: &Pool, project: &str, page: u32) -> Result<Vec<WeeklyBuildRecord>> {
    fetch_page(pool, "weekly_results", project, page)
}

fn fetch_all<T: DeserializeOwned>(pool: &Pool, table: &str) -> Result<Vec<T>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!("SELECT record_json FROM {}", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for json in rows {
        let json = json?;
        match serde_json::from_str(&json) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(table, error = %e, "Skipping unreadable stored record"),
        }
    }
    Ok(records)
}

/// Fetch all nightly records (grouping input for the dashboard summary).
pub fn nightly_all(pool: &Pool) -> Result<Vec<RunRecord>> {
    fetch_all(pool, "nightly_results")
}

/// Fetch all weekly records.
pub fn weekly_all(pool: &Pool) -> Result<Vec<WeeklyBuildRecord>> {
    fetch_all(pool, "weekly_results")
}

/// Store externalized log content under a reference id.
pub fn insert_log(pool: &Pool, id: &str, content: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO task_logs (id, content) VALUES (?1, ?2)",
        params![id, content],
    )?;
    Ok(())
}

/// Fetch raw log text by reference id.
pub fn get_log(pool: &Pool, id: &str) -> Result<Option<String>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT content FROM task_logs WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    Ok(rows.next().transpose()?)
}

/// Append one line to the system activity log.
pub fn append_activity(pool: &Pool, message: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO activity_log (message) VALUES (?1)",
        params![message],
    )?;
    Ok(())
}

/// Read the activity log, newest entry first.
pub fn activity_log(pool: &Pool, limit: usize) -> Result<Vec<String>> {
    let conn = pool.get()?;
    let mut stmt =
        conn.prepare("SELECT message FROM activity_log ORDER BY id DESC LIMIT ?1")?;
    let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;

    let mut lines = Vec::new();
    for line in rows {
        lines.push(line?);
    }
    Ok(lines)
}

/// Register a preset for a project. Duplicates are ignored.
pub fn add_preset(pool: &Pool, project: &str, preset: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT OR IGNORE INTO presets (project, preset) VALUES (?1, ?2)",
        params![project, preset],
    )?;
    Ok(())
}

/// List all known presets grouped by project, both levels sorted by name.
pub fn list_presets(pool: &Pool) -> Result<Vec<(String, Vec<String>)>> {
    let conn = pool.get()?;
    let mut stmt =
        conn.prepare("SELECT project, preset FROM presets ORDER BY project, preset")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for row in rows {
        let (project, preset) = row?;
        match grouped.last_mut() {
            Some((p, presets)) if *p == project => presets.push(preset),
            _ => grouped.push((project, vec![preset])),
        }
    }
    Ok(grouped)
}
