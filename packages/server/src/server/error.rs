//! API error responses.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use monitor_engine::{ErrorKind, MonitorError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The client spent its request budget for the current window
    #[error("rate limit of {limit} requests per {window_seconds}s exceeded; retry in {retry_after}s")]
    RateLimited {
        limit: usize,
        window_seconds: u64,
        retry_after: u64,
    },

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Monitor(e) => match e.kind() {
                ErrorKind::SessionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::ExtractionFailed => StatusCode::BAD_GATEWAY,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::InvalidInterval => StatusCode::BAD_REQUEST,
                ErrorKind::StoreCorruption => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => ErrorKind::RateLimited.as_str(),
            ApiError::Monitor(e) => e.kind().as_str(),
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(format!("failed to serialize response: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error"),
            kind: self.kind(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let ApiError::RateLimited { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}
