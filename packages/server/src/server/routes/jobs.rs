use axum::{
    extract::{Extension, Query},
    response::Response,
    Json,
};
use monitor_engine::JobRecord;
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::cached_json;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Requested limit, defaulted and clamped to `1..=max`.
    pub fn resolve(&self, max: usize) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, max)
    }
}

#[derive(Serialize)]
pub struct JobsResponse {
    jobs: Vec<JobRecord>,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearJobsResponse {
    message: String,
    cleared: usize,
    total_jobs_seen: u64,
}

/// Most recently detected jobs first
pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let limit = query.resolve(MAX_LIMIT);
    let stamp = vec![state.monitor.revisions().store];
    let monitor = state.monitor.clone();

    cached_json(
        &state.cache,
        format!("jobs:{}", limit),
        stamp,
        state.settings.jobs_ttl,
        || async move {
            let jobs = monitor.list_jobs(limit).await?;
            Ok(JobsResponse {
                count: jobs.len(),
                jobs,
            })
        },
    )
    .await
}

pub async fn clear_jobs_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<ClearJobsResponse>, ApiError> {
    let cleared = state.monitor.clear_jobs().await?;
    Ok(Json(ClearJobsResponse {
        message: format!("Cleared {} jobs", cleared),
        cleared,
        total_jobs_seen: state.monitor.status().total_jobs_seen,
    }))
}
