use axum::{extract::Extension, response::Response, Json};
use monitor_engine::MonitorStatus;
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::cached_json;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRequest {
    pub interval_seconds: Option<u64>,
}

#[derive(Serialize)]
pub struct ControlResponse {
    message: String,
    status: MonitorStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    message: String,
    check_number: u64,
    found: usize,
    new_jobs: usize,
    status: MonitorStatus,
}

/// Requested interval from an optional JSON body. A missing or malformed
/// body means "keep the current interval".
fn requested_interval(body: Option<Json<IntervalRequest>>) -> Option<u64> {
    body.and_then(|Json(req)| req.interval_seconds)
}

pub async fn status_handler(Extension(state): Extension<AppState>) -> Result<Response, ApiError> {
    let revisions = state.monitor.revisions();
    let stamp = vec![revisions.state, revisions.store];
    let monitor = state.monitor.clone();

    cached_json(
        &state.cache,
        "status".to_string(),
        stamp,
        state.settings.status_ttl,
        || async move { Ok(monitor.status()) },
    )
    .await
}

pub async fn start_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<IntervalRequest>>,
) -> Json<ControlResponse> {
    let was_running = state.monitor.status().is_running;
    let status = state.monitor.start(requested_interval(body));
    let message = if was_running {
        format!(
            "Monitoring already running (interval {}s)",
            status.poll_interval_seconds
        )
    } else {
        format!("Monitoring started (interval {}s)", status.poll_interval_seconds)
    };
    Json(ControlResponse { message, status })
}

pub async fn stop_handler(Extension(state): Extension<AppState>) -> Json<ControlResponse> {
    let status = state.monitor.stop();
    Json(ControlResponse {
        message: "Monitoring stopped".to_string(),
        status,
    })
}

pub async fn restart_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<IntervalRequest>>,
) -> Json<ControlResponse> {
    let status = state.monitor.restart(requested_interval(body));
    Json(ControlResponse {
        message: format!("Monitoring restarted (interval {}s)", status.poll_interval_seconds),
        status,
    })
}

/// Run one check now. Waits for an in-flight scheduled cycle first.
pub async fn check_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<CheckResponse>, ApiError> {
    let report = state.monitor.check_now().await?;
    Ok(Json(CheckResponse {
        message: format!("{} new jobs found", report.new_jobs),
        check_number: report.check_number,
        found: report.found,
        new_jobs: report.new_jobs,
        status: state.monitor.status(),
    }))
}
