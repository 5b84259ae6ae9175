use axum::{
    extract::{Extension, Query},
    response::Response,
    Json,
};
use monitor_engine::LogEntry;
use serde::Serialize;

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::cached_json;
use crate::server::routes::jobs::ListQuery;

#[derive(Serialize)]
pub struct LogsResponse {
    logs: Vec<LogEntry>,
    count: usize,
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

/// Recent activity, oldest first. The limit is capped at the log capacity.
pub async fn logs_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let limit = query.resolve(state.monitor.log_capacity());
    let stamp = vec![state.monitor.revisions().log];
    let monitor = state.monitor.clone();

    cached_json(
        &state.cache,
        format!("logs:{}", limit),
        stamp,
        state.settings.logs_ttl,
        || async move {
            let logs = monitor.logs(limit);
            Ok(LogsResponse {
                count: logs.len(),
                logs,
            })
        },
    )
    .await
}

pub async fn clear_logs_handler(Extension(state): Extension<AppState>) -> Json<MessageResponse> {
    state.monitor.clear_logs();
    Json(MessageResponse {
        message: "Logs cleared",
    })
}
