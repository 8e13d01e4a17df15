//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS nightly_results (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            time_stamp TEXT,
            record_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS weekly_results (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            time_stamp TEXT,
            record_json TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS task_logs (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS scheduled_builds (
            id TEXT PRIMARY KEY,
            project TEXT NOT NULL,
            preset TEXT NOT NULL,
            status TEXT NOT NULL,
            time_stamp TEXT NOT NULL,
            link TEXT,
            log TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS heartbeats (
            service TEXT NOT NULL,
            signal TEXT NOT NULL,
            last_heartbeat TEXT NOT NULL,
            PRIMARY KEY (service, signal)
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS presets (
            project TEXT NOT NULL,
            preset TEXT NOT NULL,
            UNIQUE (project, preset)
        );

        CREATE INDEX IF NOT EXISTS idx_nightly_project_time
            ON nightly_results(project, time_stamp);
        CREATE INDEX IF NOT EXISTS idx_weekly_project_time
            ON weekly_results(project, time_stamp);
        CREATE INDEX IF NOT EXISTS idx_builds_time
            ON scheduled_builds(time_stamp);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM nightly_results", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scheduled_builds", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error
    }
}
