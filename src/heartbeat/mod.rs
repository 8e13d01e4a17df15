//! Heartbeat tracking for external CI services.
//!
//! Each tracked service emits named signals (e.g. "poller", "uploader"); a
//! service counts as active while any of its signals was heard within the
//! staleness threshold.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::storage::{self, Pool};

/// One named liveness signal of a tracked service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub last_heartbeat: DateTime<Utc>,
}

/// External service with its heartbeat signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedService {
    pub name: String,
    pub is_active: bool,
    pub signals: Vec<Signal>,
}

/// SQLite-backed heartbeat registry.
#[derive(Clone)]
pub struct HeartbeatRegistry {
    pool: Pool,
    stale_after: Duration,
}

impl HeartbeatRegistry {
    pub fn new(pool: Pool, stale_after: Duration) -> Self {
        Self { pool, stale_after }
    }

    /// Record a heartbeat for a service signal at the current instant.
    pub fn record(&self, service: &str, signal: &str) -> Result<()> {
        self.record_at(service, signal, Utc::now())
    }

    pub fn record_at(&self, service: &str, signal: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO heartbeats (service, signal, last_heartbeat)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (service, signal) DO UPDATE SET last_heartbeat = excluded.last_heartbeat",
            params![service, signal, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// All tracked services with computed liveness, sorted by name.
    pub fn tracked_services(&self) -> Result<Vec<TrackedService>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT service, signal, last_heartbeat FROM heartbeats ORDER BY service, signal",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let deadline = Utc::now() - self.stale_after;
        let mut services: Vec<TrackedService> = Vec::new();

        for row in rows {
            let (service, signal, last_heartbeat) = row?;
            let last_heartbeat = DateTime::parse_from_rfc3339(&last_heartbeat)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_default();
            let signal = Signal {
                id: signal,
                last_heartbeat,
            };

            match services.last_mut() {
                Some(s) if s.name == service => s.signals.push(signal),
                _ => services.push(TrackedService {
                    name: service,
                    is_active: false,
                    signals: vec![signal],
                }),
            }
        }

        for service in &mut services {
            service.is_active = service.signals.iter().any(|s| s.last_heartbeat >= deadline);
        }
        Ok(services)
    }
}

/// Background sweep: logs an activity line whenever a service flips between
/// active and stale. Runs until the process exits.
pub async fn run_sweeper_loop(registry: HeartbeatRegistry, pool: Pool, every: std::time::Duration) {
    tracing::info!("Heartbeat sweeper started");

    let mut previous: Option<Vec<(String, bool)>> = None;
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let services = match registry.tracked_services() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Heartbeat sweep failed");
                continue;
            }
        };

        let current: Vec<(String, bool)> = services
            .iter()
            .map(|s| (s.name.clone(), s.is_active))
            .collect();

        if let Some(prev) = &previous {
            for (name, active) in &current {
                let was_active = prev
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, a)| *a)
                    .unwrap_or(*active);
                if was_active != *active {
                    let line = if *active {
                        format!("Service {} is back online", name)
                    } else {
                        format!("Service {} went silent", name)
                    };
                    tracing::warn!(service = %name, active = *active, "Service liveness changed");
                    if let Err(e) = storage::append_activity(&pool, &line) {
                        tracing::error!(error = %e, "Failed to log liveness change");
                    }
                }
            }
        }
        previous = Some(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, HeartbeatRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
        (dir, HeartbeatRegistry::new(pool, Duration::minutes(5)))
    }

    #[test]
    fn test_fresh_heartbeat_is_active() {
        let (_dir, reg) = registry();
        reg.record("uploader", "main").unwrap();

        let services = reg.tracked_services().unwrap();
        assert_eq!(services.len(), 1);
        assert!(services[0].is_active);
        assert_eq!(services[0].signals[0].id, "main");
    }

    #[test]
    fn test_stale_heartbeat_is_inactive() {
        let (_dir, reg) = registry();
        reg.record_at("uploader", "main", Utc::now() - Duration::hours(2))
            .unwrap();

        let services = reg.tracked_services().unwrap();
        assert!(!services[0].is_active);
    }

    #[test]
    fn test_any_fresh_signal_keeps_service_active() {
        let (_dir, reg) = registry();
        reg.record_at("poller", "fetch", Utc::now() - Duration::hours(2))
            .unwrap();
        reg.record("poller", "push").unwrap();

        let services = reg.tracked_services().unwrap();
        assert_eq!(services[0].signals.len(), 2);
        assert!(services[0].is_active);
    }

    #[test]
    fn test_repeat_heartbeat_updates_in_place() {
        let (_dir, reg) = registry();
        reg.record_at("poller", "fetch", Utc::now() - Duration::hours(2))
            .unwrap();
        reg.record("poller", "fetch").unwrap();

        let services = reg.tracked_services().unwrap();
        assert_eq!(services[0].signals.len(), 1);
        assert!(services[0].is_active);
    }
}
