//! HTTP-level tests for the control API.
//!
//! Each test builds the full router around a monitor with mock
//! collaborators and drives it with `oneshot` requests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header::RETRY_AFTER, Method, Request, StatusCode},
    response::Response,
    Router,
};
use monitor_engine::testing::{candidates, MockExtractor, MockLauncher};
use monitor_engine::{Collaborators, JobExtractor, Monitor, MonitorConfig, RetryPolicy};
use monitor_server::server::{
    build_app,
    middleware::{RateLimiter, X_CACHE, X_POLL_INTERVAL, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING},
    AppState, HttpSettings,
};
use serde_json::Value;
use tower::ServiceExt;

const CLIENT: &str = "198.51.100.7";

struct TestApp {
    router: Router,
    monitor: Arc<Monitor>,
}

fn test_app_with(
    launcher: MockLauncher,
    extractor: Arc<dyn JobExtractor>,
    limit: usize,
) -> TestApp {
    let root = std::env::temp_dir().join(format!(
        "monitor-api-{}",
        uuid::Uuid::new_v4().simple()
    ));
    let config = MonitorConfig::default()
        .with_session_root(root)
        .with_retry(RetryPolicy::new(3, Duration::from_millis(100), 2.0));
    let collaborators = Collaborators::builder()
        .launcher(Arc::new(launcher))
        .extractor(extractor)
        .build();
    let monitor = Arc::new(Monitor::new(config, collaborators));

    let limiter = RateLimiter::new(limit, Duration::from_secs(60));
    let state = AppState::new(monitor.clone(), limiter, HttpSettings::default());
    TestApp {
        router: build_app(state),
        monitor,
    }
}

fn test_app(limit: usize) -> TestApp {
    test_app_with(
        MockLauncher::new(),
        Arc::new(MockExtractor::returning(candidates(3))),
        limit,
    )
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, client: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, CLIENT, None).await
    }

    async fn post(&self, uri: &str, body: Option<Value>) -> Response {
        self.send(Method::POST, uri, CLIENT, body).await
    }

    async fn delete(&self, uri: &str) -> Response {
        self.send(Method::DELETE, uri, CLIENT, None).await
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sixty_first_request_is_rejected() {
    let app = test_app(60);

    for i in 0..60 {
        let response = app.get("/status").await;
        assert_eq!(response.status(), StatusCode::OK, "request {} rejected", i + 1);
    }

    let response = app.get("/status").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[RETRY_AFTER], "60");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");

    let body = json_body(response).await;
    assert_eq!(body["kind"], "rate_limited");
}

#[tokio::test(start_paused = true)]
async fn test_budget_frees_up_after_window() {
    let app = test_app(2);

    assert_eq!(app.get("/status").await.status(), StatusCode::OK);
    assert_eq!(app.get("/status").await.status(), StatusCode::OK);
    assert_eq!(app.get("/status").await.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(app.get("/status").await.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_health_and_root_are_exempt() {
    let app = test_app(2);

    app.get("/status").await;
    app.get("/status").await;
    assert_eq!(app.get("/status").await.status(), StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..10 {
        assert_eq!(app.get("/health").await.status(), StatusCode::OK);
        assert_eq!(app.get("/").await.status(), StatusCode::OK);
    }

    // Another client has its own budget
    let other = app.send(Method::GET, "/status", "198.51.100.8", None).await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_shaping_headers_on_every_response() {
    let app = test_app(60);

    for uri in ["/", "/health", "/status", "/jobs", "/logs"] {
        let response = app.get(uri).await;
        let headers = response.headers();
        assert_eq!(headers[X_POLL_INTERVAL], "30", "missing poll interval on {}", uri);
        assert_eq!(headers[X_RATELIMIT_LIMIT], "60", "missing limit on {}", uri);
        assert!(headers.contains_key(X_RATELIMIT_REMAINING));
    }

    let response = app.get("/no-such-route").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[X_POLL_INTERVAL], "30");
}

// =============================================================================
// Response cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_status_cached_until_state_changes() {
    let app = test_app(60);

    let first = app.get("/status").await;
    assert_eq!(first.headers()[X_CACHE], "MISS");
    let second = app.get("/status").await;
    assert_eq!(second.headers()[X_CACHE], "HIT");

    app.post("/start", Some(serde_json::json!({ "intervalSeconds": 60 })))
        .await;

    let after = app.get("/status").await;
    assert_eq!(after.headers()[X_CACHE], "MISS");
    let body = json_body(after).await;
    assert_eq!(body["isRunning"], true);
    assert_eq!(body["pollIntervalSeconds"], 60);

    app.monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_jobs_cache_invalidated_by_check() {
    let app = test_app(60);

    let empty = app.get("/jobs").await;
    assert_eq!(empty.headers()[X_CACHE], "MISS");
    assert_eq!(json_body(empty).await["count"], 0);
    assert_eq!(app.get("/jobs").await.headers()[X_CACHE], "HIT");

    let check = app.post("/check", None).await;
    assert_eq!(check.status(), StatusCode::OK);
    let report = json_body(check).await;
    assert_eq!(report["newJobs"], 3);
    assert_eq!(report["found"], 3);

    let fresh = app.get("/jobs").await;
    assert_eq!(fresh.headers()[X_CACHE], "MISS");
    assert_eq!(json_body(fresh).await["count"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_cache_expires_after_ttl() {
    let app = test_app(60);

    assert_eq!(app.get("/logs").await.headers()[X_CACHE], "MISS");
    assert_eq!(app.get("/logs").await.headers()[X_CACHE], "HIT");

    tokio::time::advance(HttpSettings::default().logs_ttl).await;
    assert_eq!(app.get("/logs").await.headers()[X_CACHE], "MISS");
}

// =============================================================================
// Control endpoints
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_clamps_interval_and_stop() {
    let app = test_app(60);

    let response = app
        .post("/start", Some(serde_json::json!({ "intervalSeconds": 2 })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[X_POLL_INTERVAL], "5");
    let body = json_body(response).await;
    assert_eq!(body["status"]["isRunning"], true);
    assert_eq!(body["status"]["pollIntervalSeconds"], 5);

    let response = app.post("/stop", None).await;
    let body = json_body(response).await;
    assert_eq!(body["message"], "Monitoring stopped");

    app.monitor.shutdown().await;
    assert!(!app.monitor.status().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_start_without_body_keeps_interval() {
    let app = test_app(60);

    let body = json_body(app.post("/start", None).await).await;
    assert_eq!(body["status"]["pollIntervalSeconds"], 30);

    let again = json_body(app.post("/start", None).await).await;
    assert_eq!(again["message"], "Monitoring already running (interval 30s)");

    app.monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_check_reports_unavailable_session() {
    let app = test_app_with(
        MockLauncher::new().always_failing(),
        Arc::new(MockExtractor::returning(candidates(1))),
        60,
    );

    let response = app.post("/check", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "session_unavailable");

    let status = app.monitor.status();
    assert_eq!(status.errors_encountered, 1);
    assert!(!status.session_healthy);
}

#[tokio::test(start_paused = true)]
async fn test_check_reports_extraction_failure() {
    let app = test_app_with(
        MockLauncher::new(),
        Arc::new(MockExtractor::failing("navigation failed")),
        60,
    );

    let response = app.post("/check", None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["kind"], "extraction_failed");
}

#[tokio::test(start_paused = true)]
async fn test_clear_jobs_keeps_counters() {
    let app = test_app(60);
    app.post("/check", None).await;

    let response = app.delete("/jobs").await;
    let body = json_body(response).await;
    assert_eq!(body["cleared"], 3);
    assert_eq!(body["message"], "Cleared 3 jobs");

    let status = json_body(app.get("/status").await).await;
    assert_eq!(status["checksPerformed"], 1);
    assert_eq!(json_body(app.get("/jobs").await).await["count"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_logs_limit_and_clear() {
    let app = test_app(60);
    app.post("/check", None).await;

    let body = json_body(app.get("/logs?limit=2").await).await;
    assert_eq!(body["count"], 2);

    let response = app.delete("/logs").await;
    assert_eq!(json_body(response).await["message"], "Logs cleared");

    let body = json_body(app.get("/logs").await).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["logs"][0]["message"], "Logs cleared");
}

#[tokio::test(start_paused = true)]
async fn test_health_reports_liveness() {
    let app = test_app(60);

    let body = json_body(app.get("/health").await).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["isRunning"], false);

    let info = json_body(app.get("/").await).await;
    assert_eq!(info["service"], "job-monitor");
    assert_eq!(info["state"], "idle");
}
