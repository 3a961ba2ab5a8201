//! Auxiliary HTTP endpoint: health and store counts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::bot::database::{Counts, Database};

pub const SERVICE_NAME: &str = "roost";

#[derive(Clone)]
pub struct WebState {
    pub db: Arc<Database>,
    pub started_at: Instant,
}

impl WebState {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, started_at: Instant::now() }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind before spawning so a taken port fails startup instead of a background task.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web endpoint on {addr}"))
}

/// Serve until `shutdown` is cancelled.
pub async fn run(listener: TcpListener, state: WebState, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!("🌐 Web endpoint listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("web endpoint failed")?;

    info!("Web endpoint stopped");
    Ok(())
}

async fn health(State(state): State<WebState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, error) = match state.db.ping() {
        Ok(()) => (StatusCode::OK, "ok", None),
        Err(e) => {
            warn!("Health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", Some(e.to_string()))
        }
    };

    let body = HealthResponse {
        status,
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        error,
    };
    (code, Json(body))
}

async fn stats(State(state): State<WebState>) -> Result<Json<Counts>, (StatusCode, Json<serde_json::Value>)> {
    state.db.counts().map(Json).map_err(|e| {
        warn!("Stats query failed: {e}");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })
}
