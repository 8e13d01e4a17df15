//! Scheduled build queue.
//!
//! The dashboard owns the queue rows but not the build lifecycle: an external
//! builder picks up queued entries and reports progress through the `mark_*`
//! methods. The only user-originated transitions are `cancel` (from `Queued`)
//! and `archive` (from a terminal state); everything else is display-only.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{self, Pool};

/// Lifecycle state of a scheduled build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Building,
    Finished,
    Failed,
    Archived,
}

impl BuildStatus {
    /// Finished or failed: the build is done and can be archived.
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Finished | BuildStatus::Failed)
    }

    fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Building => "building",
            BuildStatus::Finished => "finished",
            BuildStatus::Failed => "failed",
            BuildStatus::Archived => "archived",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(BuildStatus::Queued),
            "building" => Some(BuildStatus::Building),
            "finished" => Some(BuildStatus::Finished),
            "failed" => Some(BuildStatus::Failed),
            "archived" => Some(BuildStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued/running/finished build task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBuild {
    pub id: Uuid,
    pub project: String,
    pub preset: String,
    pub status: BuildStatus,
    pub time_stamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

/// Request body for queueing a new build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueBuildRequest {
    pub project: String,
    pub preset: String,
}

/// Progress report body sent by the external builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

/// Preset catalog entry: a project and its known build presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPresets {
    pub id: String,
    pub presets: Vec<String>,
}

/// Queue operation failures. Invalid transitions are rejected, never applied
/// silently.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("build {0} not found")]
    NotFound(Uuid),
    #[error("cannot {action} build in state {from}")]
    InvalidTransition {
        from: BuildStatus,
        action: &'static str,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Storage(e.into())
    }
}

impl From<r2d2::Error> for QueueError {
    fn from(e: r2d2::Error) -> Self {
        QueueError::Storage(e.into())
    }
}

/// SQLite-backed build queue.
#[derive(Clone)]
pub struct BuildQueue {
    pool: Pool,
}

impl BuildQueue {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new build in `Queued` state.
    pub fn enqueue(&self, project: &str, preset: &str) -> Result<ScheduledBuild> {
        let build = ScheduledBuild {
            id: Uuid::new_v4(),
            project: project.to_string(),
            preset: preset.to_string(),
            status: BuildStatus::Queued,
            time_stamp: Utc::now(),
            link: None,
            log: None,
        };

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO scheduled_builds (id, project, preset, status, time_stamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                build.id.to_string(),
                build.project,
                build.preset,
                build.status.as_str(),
                build.time_stamp.to_rfc3339()
            ],
        )?;
        storage::add_preset(&self.pool, project, preset)?;

        self.audit(&format!("Queued build {}/{}", project, preset));
        Ok(build)
    }

    /// List all builds, newest first.
    pub fn list(&self) -> Result<Vec<ScheduledBuild>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, project, preset, status, time_stamp, link, log
             FROM scheduled_builds ORDER BY time_stamp DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut builds = Vec::new();
        for row in rows {
            let (id, project, preset, status, time_stamp, link, log) = row?;
            let Ok(id) = Uuid::parse_str(&id) else {
                tracing::warn!(%id, "Skipping build row with malformed id");
                continue;
            };
            let Some(status) = BuildStatus::parse(&status) else {
                tracing::warn!(%id, %status, "Skipping build row with unknown status");
                continue;
            };
            builds.push(ScheduledBuild {
                id,
                project,
                preset,
                status,
                time_stamp: DateTime::parse_from_rfc3339(&time_stamp)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
                link,
                log,
            });
        }
        Ok(builds)
    }

    /// Fetch one build by id.
    pub fn get(&self, id: Uuid) -> Result<Option<ScheduledBuild>, QueueError> {
        Ok(self.list()?.into_iter().find(|b| b.id == id))
    }

    /// Cancel a build. Only valid while it is still `Queued`; a cancelled
    /// build goes straight to `Archived`.
    pub fn cancel(&self, id: Uuid) -> Result<ScheduledBuild, QueueError> {
        let build = self.get(id)?.ok_or(QueueError::NotFound(id))?;
        if build.status != BuildStatus::Queued {
            return Err(QueueError::InvalidTransition {
                from: build.status,
                action: "cancel",
            });
        }
        let build = self.set_status(build, BuildStatus::Archived)?;
        self.audit(&format!("Cancelled build {}/{}", build.project, build.preset));
        Ok(build)
    }

    /// Archive a finished or failed build.
    pub fn archive(&self, id: Uuid) -> Result<ScheduledBuild, QueueError> {
        let build = self.get(id)?.ok_or(QueueError::NotFound(id))?;
        if !build.status.is_terminal() {
            return Err(QueueError::InvalidTransition {
                from: build.status,
                action: "archive",
            });
        }
        let build = self.set_status(build, BuildStatus::Archived)?;
        self.audit(&format!("Archived build {}/{}", build.project, build.preset));
        Ok(build)
    }

    /// Builder progress report: the build was picked up.
    pub fn mark_building(&self, id: Uuid) -> Result<ScheduledBuild, QueueError> {
        self.transition(id, BuildStatus::Queued, BuildStatus::Building, "start")
    }

    /// Builder progress report: the build completed.
    pub fn mark_finished(
        &self,
        id: Uuid,
        link: Option<String>,
        log: Option<String>,
    ) -> Result<ScheduledBuild, QueueError> {
        let build = self.get(id)?.ok_or(QueueError::NotFound(id))?;
        if build.status != BuildStatus::Building {
            return Err(QueueError::InvalidTransition {
                from: build.status,
                action: "finish",
            });
        }

        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE scheduled_builds
             SET status = ?2, link = ?3, log = ?4, updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id.to_string(),
                BuildStatus::Finished.as_str(),
                link,
                log
            ],
        )?;
        self.audit(&format!("Build {}/{} finished", build.project, build.preset));
        self.get(id)?.ok_or(QueueError::NotFound(id))
    }

    /// Builder progress report: the build failed.
    pub fn mark_failed(&self, id: Uuid, log: Option<String>) -> Result<ScheduledBuild, QueueError> {
        let build = self.get(id)?.ok_or(QueueError::NotFound(id))?;
        if build.status != BuildStatus::Building {
            return Err(QueueError::InvalidTransition {
                from: build.status,
                action: "fail",
            });
        }

        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE scheduled_builds
             SET status = ?2, log = ?3, updated_at = datetime('now')
             WHERE id = ?1",
            params![id.to_string(), BuildStatus::Failed.as_str(), log],
        )?;
        self.audit(&format!("Build {}/{} failed", build.project, build.preset));
        self.get(id)?.ok_or(QueueError::NotFound(id))
    }

    fn transition(
        &self,
        id: Uuid,
        from: BuildStatus,
        to: BuildStatus,
        action: &'static str,
    ) -> Result<ScheduledBuild, QueueError> {
        let build = self.get(id)?.ok_or(QueueError::NotFound(id))?;
        if build.status != from {
            return Err(QueueError::InvalidTransition {
                from: build.status,
                action,
            });
        }
        let build = self.set_status(build, to)?;
        self.audit(&format!(
            "Build {}/{} is now {}",
            build.project, build.preset, build.status
        ));
        Ok(build)
    }

    fn set_status(
        &self,
        mut build: ScheduledBuild,
        status: BuildStatus,
    ) -> Result<ScheduledBuild, QueueError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE scheduled_builds SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![build.id.to_string(), status.as_str()],
        )?;
        build.status = status;
        Ok(build)
    }

    // Audit failures must not fail the queue operation itself.
    fn audit(&self, message: &str) {
        if let Err(e) = storage::append_activity(&self.pool, message) {
            tracing::error!(error = %e, "Failed to append activity log entry");
        }
    }
}
