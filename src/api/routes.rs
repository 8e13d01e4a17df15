//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::heartbeat::TrackedService;
use crate::queue::{BuildReport, ProjectPresets, QueueBuildRequest, ScheduledBuild};
use crate::report::view::{self, DashboardReport, NightlyRow, WeeklyRow};
use crate::report::{group_and_sort, ProjectRecord};
use crate::storage;

const ACTIVITY_LOG_LIMIT: usize = 200;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .route("/reports/nightly", get(nightly_reports))
        .route("/reports/weekly", get(weekly_reports))
        .route("/builds", get(list_builds).post(queue_build))
        .route("/builds/{id}/cancel", post(cancel_build))
        .route("/builds/{id}/archive", post(archive_build))
        .route("/builds/{id}/building", post(report_building))
        .route("/builds/{id}/finished", post(report_finished))
        .route("/builds/{id}/failed", post(report_failed))
        .route("/presets", get(list_presets))
        .route("/services", get(list_services))
        .route("/services/{name}/beat/{signal}", post(record_heartbeat))
        .route("/system/log", get(system_log))
        .route("/logs/{id}", get(get_log))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Per-project summary: latest nightly and weekly rows plus totals for the
/// paginated drill-downs. Projects are ordered by their most recent record
/// of either kind, so a weekly-only project can outrank a stale nightly one.
async fn dashboard(State(state): State<AppState>) -> Result<Json<Vec<DashboardReport>>, ApiError> {
    let nightly = group_and_sort(storage::nightly_all(&state.pool)?);
    let weekly = group_and_sort(storage::weekly_all(&state.pool)?);

    let mut reports: Vec<(DateTime<Utc>, DashboardReport)> = nightly
        .iter()
        .map(|(project, records)| {
            let latest_at = records
                .first()
                .map(|r| r.sort_timestamp())
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let report = DashboardReport {
                project: project.clone(),
                nightly_count: records.len() as u64,
                weekly_count: 0,
                latest_nightly: records.first().map(view::nightly_row),
                latest_weekly: None,
            };
            (latest_at, report)
        })
        .collect();

    for (project, records) in &weekly {
        let latest_at = records
            .first()
            .map(|r| r.sort_timestamp())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let latest = records.first().map(view::weekly_row);
        match reports.iter_mut().find(|(_, r)| r.project == *project) {
            Some((at, report)) => {
                report.weekly_count = records.len() as u64;
                report.latest_weekly = latest;
                *at = (*at).max(latest_at);
            }
            None => reports.push((
                latest_at,
                DashboardReport {
                    project: project.clone(),
                    nightly_count: 0,
                    weekly_count: records.len() as u64,
                    latest_nightly: None,
                    latest_weekly: latest,
                },
            )),
        }
    }

    reports.sort_by(|(a, _), (b, _)| b.cmp(a));
    Ok(Json(reports.into_iter().map(|(_, r)| r).collect()))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    project: String,
    #[serde(default)]
    page: Option<u32>,
}

async fn nightly_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<NightlyRow>>, ApiError> {
    let page = query.page.unwrap_or(1);
    let records = storage::nightly_page(&state.pool, &query.project, page)?;
    Ok(Json(records.iter().map(view::nightly_row).collect()))
}

async fn weekly_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<WeeklyRow>>, ApiError> {
    let page = query.page.unwrap_or(1);
    let records = storage::weekly_page(&state.pool, &query.project, page)?;
    Ok(Json(records.iter().map(view::weekly_row).collect()))
}

async fn list_builds(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduledBuild>>, ApiError> {
    Ok(Json(state.queue.list()?))
}

async fn queue_build(
    State(state): State<AppState>,
    Json(req): Json<QueueBuildRequest>,
) -> Result<Json<ScheduledBuild>, ApiError> {
    let build = state.queue.enqueue(&req.project, &req.preset)?;
    Ok(Json(build))
}

async fn cancel_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledBuild>, ApiError> {
    Ok(Json(state.queue.cancel(id)?))
}

async fn archive_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledBuild>, ApiError> {
    Ok(Json(state.queue.archive(id)?))
}

// Progress reports from the external builder. The dashboard never initiates
// these transitions itself.

async fn report_building(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledBuild>, ApiError> {
    Ok(Json(state.queue.mark_building(id)?))
}

async fn report_finished(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(report): Json<BuildReport>,
) -> Result<Json<ScheduledBuild>, ApiError> {
    Ok(Json(state.queue.mark_finished(id, report.link, report.log)?))
}

async fn report_failed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(report): Json<BuildReport>,
) -> Result<Json<ScheduledBuild>, ApiError> {
    Ok(Json(state.queue.mark_failed(id, report.log)?))
}

async fn list_presets(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectPresets>>, ApiError> {
    let presets = storage::list_presets(&state.pool)?
        .into_iter()
        .map(|(id, presets)| ProjectPresets { id, presets })
        .collect();
    Ok(Json(presets))
}

async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<TrackedService>>, ApiError> {
    Ok(Json(state.heartbeats.tracked_services()?))
}

async fn record_heartbeat(
    State(state): State<AppState>,
    Path((name, signal)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.heartbeats.record(&name, &signal)?;
    Ok(Json(json!({ "ok": true })))
}

async fn system_log(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(storage::activity_log(&state.pool, ACTIVITY_LOG_LIMIT)?))
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    storage::get_log(&state.pool, &id)?.ok_or(ApiError::NotFound)
}
