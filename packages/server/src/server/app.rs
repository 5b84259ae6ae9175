//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use monitor_engine::Monitor;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::server::middleware::{
    extract_client_ip, shape_request, RateLimiter, ResponseCache, X_CACHE, X_POLL_INTERVAL,
    X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
use crate::server::routes::{
    check_handler, clear_jobs_handler, clear_logs_handler, health_handler, list_jobs_handler,
    logs_handler, restart_handler, root_handler, start_handler, status_handler, stop_handler,
};

/// HTTP-side settings that are not engine concerns.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub status_ttl: Duration,
    pub jobs_ttl: Duration,
    pub logs_ttl: Duration,
    pub allowed_origins: Vec<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            status_ttl: Duration::from_secs(5),
            jobs_ttl: Duration::from_secs(10),
            logs_ttl: Duration::from_secs(5),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            status_ttl: Duration::from_secs(config.cache_ttl_status_seconds),
            jobs_ttl: Duration::from_secs(config.cache_ttl_jobs_seconds),
            logs_ttl: Duration::from_secs(config.cache_ttl_logs_seconds),
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub cache: Arc<ResponseCache>,
    pub limiter: Arc<RateLimiter>,
    pub settings: Arc<HttpSettings>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, limiter: RateLimiter, settings: HttpSettings) -> Self {
        Self {
            monitor,
            cache: Arc::new(ResponseCache::new()),
            limiter: Arc::new(limiter),
            settings: Arc::new(settings),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            X_CACHE,
            X_POLL_INTERVAL,
            X_RATELIMIT_LIMIT,
            X_RATELIMIT_REMAINING,
            X_RATELIMIT_RESET,
        ])
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        // Info and health (exempt from rate limiting and caching)
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        // Reads (cached)
        .route("/status", get(status_handler))
        .route("/jobs", get(list_jobs_handler).delete(clear_jobs_handler))
        .route("/logs", get(logs_handler).delete(clear_logs_handler))
        // Lifecycle
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        .route("/restart", post(restart_handler))
        .route("/check", post(check_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(shape_request))
        .layer(middleware::from_fn(extract_client_ip))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
