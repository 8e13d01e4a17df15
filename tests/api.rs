//! API integration tests -- drive the router directly with tower.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use buildboard::api::{self, state::AppState};
use buildboard::report::{RunRecord, WeeklyBuildRecord};
use buildboard::storage;

fn test_app() -> (tempfile::TempDir, Router, storage::Pool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
    let state = AppState::new(pool.clone(), chrono::Duration::minutes(5));
    (dir, api::router(state), pool)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

async fn post(app: &Router, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let req = match body {
        Some(json) => Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

fn nightly(project: &str, ts: &str) -> RunRecord {
    serde_json::from_str(&format!(
        r#"{{"Project": "{}", "TimeStamp": "{}", "BuildSuccess": true,
            "TestResults": {{"Results": [
                {{"Test": "a", "Result": true}},
                {{"Test": "b", "Result": false}}
            ]}}}}"#,
        project, ts
    ))
    .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_dir, app, _pool) = test_app();
    let (status, body) = get(&app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (_dir, app, _pool) = test_app();
    let (status, _) = get(&app, "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_orders_projects_by_recency() {
    let (_dir, app, pool) = test_app();
    storage::insert_nightly(&pool, &nightly("Alpha", "2024-05-01T00:00:10Z")).unwrap();
    storage::insert_nightly(&pool, &nightly("Beta", "2024-05-01T00:00:15Z")).unwrap();
    storage::insert_nightly(&pool, &nightly("Alpha", "2024-05-01T00:00:20Z")).unwrap();

    let (status, body) = get(&app, "/api/v1/dashboard").await;
    assert_eq!(status, StatusCode::OK);

    let reports = body.as_array().unwrap();
    assert_eq!(reports[0]["project"], "Alpha");
    assert_eq!(reports[0]["nightlyCount"], 2);
    assert_eq!(reports[1]["project"], "Beta");

    // Partial pass policy surfaces as a warning row on the dashboard.
    assert_eq!(reports[0]["latestNightly"]["tests"]["status"], "warning");
    assert_eq!(reports[0]["latestNightly"]["tests"]["text"], "1/2 passed");
}

fn weekly(project: &str, ts: &str) -> WeeklyBuildRecord {
    serde_json::from_str(&format!(
        r#"{{"Project": "{}", "TimeStamp": "{}",
            "Results": [{{"Preset": "Windows", "Success": true}}]}}"#,
        project, ts
    ))
    .unwrap()
}

#[tokio::test]
async fn test_dashboard_interleaves_weekly_only_projects() {
    let (_dir, app, pool) = test_app();
    storage::insert_nightly(&pool, &nightly("Alpha", "2024-05-01T00:00:10Z")).unwrap();
    storage::insert_weekly(&pool, &weekly("Gamma", "2024-05-02T00:00:00Z")).unwrap();
    storage::insert_nightly(&pool, &nightly("Beta", "2024-05-03T00:00:00Z")).unwrap();

    let (_, body) = get(&app, "/api/v1/dashboard").await;
    let reports = body.as_array().unwrap();

    // Gamma has only weekly records but its activity is newer than Alpha's.
    assert_eq!(reports[0]["project"], "Beta");
    assert_eq!(reports[1]["project"], "Gamma");
    assert_eq!(reports[1]["weeklyCount"], 1);
    assert!(reports[1].get("latestNightly").is_none());
    assert_eq!(reports[2]["project"], "Alpha");
}

#[tokio::test]
async fn test_nightly_reports_paginated_per_project() {
    let (_dir, app, pool) = test_app();
    storage::insert_nightly(&pool, &nightly("Alpha", "2024-05-01T00:00:10Z")).unwrap();
    storage::insert_nightly(&pool, &nightly("Beta", "2024-05-01T00:00:15Z")).unwrap();

    let (status, body) = get(&app, "/api/v1/reports/nightly?project=Alpha&page=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["project"], "Alpha");

    let (_, body) = get(&app, "/api/v1/reports/nightly?project=Alpha&page=2").await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_build_queue_lifecycle_over_http() {
    let (_dir, app, _pool) = test_app();

    let (status, build) = post(
        &app,
        "/api/v1/builds",
        Some(serde_json::json!({"project": "Alpha", "preset": "Windows"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(build["status"], "queued");
    let id = build["id"].as_str().unwrap().to_string();

    let (_, builds) = get(&app, "/api/v1/builds").await;
    assert_eq!(builds.as_array().unwrap().len(), 1);

    // Archiving a queued build is an invalid transition.
    let (status, _) = post(&app, &format!("/api/v1/builds/{}/archive", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cancelled) = post(&app, &format!("/api/v1/builds/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "archived");

    // Cancelling twice fails: the build is no longer queued.
    let (status, _) = post(&app, &format!("/api/v1/builds/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Queue actions landed in the activity log, newest first.
    let (_, log) = get(&app, "/api/v1/system/log").await;
    let lines = log.as_array().unwrap();
    assert!(lines[0].as_str().unwrap().contains("Cancelled"));
    assert!(lines[1].as_str().unwrap().contains("Queued"));
}

#[tokio::test]
async fn test_builder_progress_reports() {
    let (_dir, app, _pool) = test_app();
    let (_, build) = post(
        &app,
        "/api/v1/builds",
        Some(serde_json::json!({"project": "Alpha", "preset": "Windows"})),
    )
    .await;
    let id = build["id"].as_str().unwrap().to_string();

    let (status, b) = post(&app, &format!("/api/v1/builds/{}/building", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(b["status"], "building");

    let (status, b) = post(
        &app,
        &format!("/api/v1/builds/{}/finished", id),
        Some(serde_json::json!({"link": "https://example.com/a.zip"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(b["status"], "finished");
    assert_eq!(b["link"], "https://example.com/a.zip");

    // Now terminal: archive succeeds.
    let (status, b) = post(&app, &format!("/api/v1/builds/{}/archive", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(b["status"], "archived");
}

#[tokio::test]
async fn test_queueing_registers_preset() {
    let (_dir, app, _pool) = test_app();
    post(
        &app,
        "/api/v1/builds",
        Some(serde_json::json!({"project": "Alpha", "preset": "iOS"})),
    )
    .await;

    let (status, presets) = get(&app, "/api/v1/presets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(presets[0]["id"], "Alpha");
    assert_eq!(presets[0]["presets"][0], "iOS");
}

#[tokio::test]
async fn test_cancel_unknown_build_is_404() {
    let (_dir, app, _pool) = test_app();
    let id = uuid::Uuid::new_v4();
    let (status, _) = post(&app, &format!("/api/v1/builds/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_heartbeat_round_trip() {
    let (_dir, app, _pool) = test_app();
    let (status, _) = post(&app, "/api/v1/services/uploader/beat/main", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, services) = get(&app, "/api/v1/services").await;
    assert_eq!(services[0]["name"], "uploader");
    assert_eq!(services[0]["isActive"], true);
    assert_eq!(services[0]["signals"][0]["id"], "main");
}

#[tokio::test]
async fn test_log_retrieval() {
    let (_dir, app, pool) = test_app();
    storage::insert_log(&pool, "ref-1", "raw log\ntext").unwrap();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/logs/ref-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"raw log\ntext");

    let (status, _) = get(&app, "/api/v1/logs/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
