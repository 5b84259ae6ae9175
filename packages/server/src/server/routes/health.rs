use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use monitor_engine::SchedulerState;
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    service: &'static str,
    version: &'static str,
    target_url: String,
    state: SchedulerState,
    endpoints: &'static [&'static str],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    is_running: bool,
    session_healthy: bool,
    uptime_seconds: i64,
    timestamp: DateTime<Utc>,
}

/// Service info endpoint
pub async fn root_handler(Extension(state): Extension<AppState>) -> Json<InfoResponse> {
    let status = state.monitor.status();
    Json(InfoResponse {
        service: "job-monitor",
        version: env!("CARGO_PKG_VERSION"),
        target_url: status.target_url,
        state: status.state,
        endpoints: &[
            "GET /health",
            "GET /status",
            "GET /jobs?limit=",
            "DELETE /jobs",
            "GET /logs?limit=",
            "DELETE /logs",
            "POST /start",
            "POST /stop",
            "POST /restart",
            "POST /check",
        ],
    })
}

/// Health check endpoint
///
/// Liveness only. Session health is the value recorded by the last cycle;
/// no browser round-trip is made here.
pub async fn health_handler(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    let status = state.monitor.status();
    let now = Utc::now();
    Json(HealthResponse {
        status: "healthy",
        is_running: status.is_running,
        session_healthy: status.session_healthy,
        uptime_seconds: (now - status.started_at).num_seconds(),
        timestamp: now,
    })
}
