//! Buildboard -- CI build and test status dashboard service.
//!
//! This crate ingests CI result JSON, stores it in SQLite, serves the
//! dashboard REST API, and provides the polling-store primitive behind the
//! live build-queue and activity-log views.

pub mod api;
pub mod client;
pub mod config;
pub mod heartbeat;
pub mod ingest;
pub mod poll;
pub mod queue;
pub mod report;
pub mod storage;

use anyhow::Result;

use crate::config::Config;

/// Start the buildboard daemon: API server plus the heartbeat sweeper.
pub async fn serve(cfg: &Config) -> Result<()> {
    tracing::info!(db_path = %cfg.db_path, "Initializing database");
    let pool = storage::open_pool(&cfg.db_path)?;

    let state = api::state::AppState::new(pool.clone(), cfg.stale_after());

    // Liveness transitions land in the activity log for the system log view.
    let sweeper_registry = state.heartbeats.clone();
    let sweeper_pool = pool.clone();
    tokio::spawn(async move {
        heartbeat::run_sweeper_loop(
            sweeper_registry,
            sweeper_pool,
            std::time::Duration::from_secs(30),
        )
        .await;
    });

    let addr: std::net::SocketAddr = cfg.bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, "Buildboard listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
