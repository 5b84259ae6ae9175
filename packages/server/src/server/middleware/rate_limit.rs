// Request shaping: per-client rate limiting plus response metadata
//
// - Each client address gets a rolling window budget (default 60 requests
//   per 60 seconds). A request is counted when admitted; the window slides
//   with the oldest counted request.
// - "/" and "/health" are exempt: never counted, never rejected.
// - Every response carries X-Poll-Interval and the X-RateLimit-* budget so
//   dashboards can self-throttle.
//
// Applied in app.rs as a layer inside extract_client_ip
use axum::{
    extract::{Extension, Request},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::ClientIp;

pub const X_POLL_INTERVAL: HeaderName = HeaderName::from_static("x-poll-interval");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Paths that are never rate limited.
pub const EXEMPT_PATHS: &[&str] = &["/", "/health"];

/// Outcome of a budget check for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Until the oldest counted request leaves the window
    pub reset_after: Duration,
}

impl RateDecision {
    /// Whole seconds until the budget frees up, rounded up.
    pub fn reset_seconds(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Strict sliding-window log per client address.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: DashMap<IpAddr, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            clients: DashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict(&self, hits: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn decision(&self, hits: &VecDeque<Instant>, now: Instant, allowed: bool) -> RateDecision {
        let reset_after = hits
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO);
        RateDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(hits.len()),
            reset_after,
        }
    }

    /// Count one request from `ip` if its budget allows.
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        let now = Instant::now();
        let mut hits = self.clients.entry(ip).or_default();
        self.evict(&mut hits, now);

        let allowed = hits.len() < self.limit;
        if allowed {
            hits.push_back(now);
        }
        self.decision(&hits, now, allowed)
    }

    /// Current budget for `ip` without counting a request.
    pub fn peek(&self, ip: IpAddr) -> RateDecision {
        let now = Instant::now();
        match self.clients.get_mut(&ip) {
            Some(mut hits) => {
                self.evict(&mut hits, now);
                self.decision(&hits, now, true)
            }
            None => self.decision(&VecDeque::new(), now, true),
        }
    }

    /// Drop clients with no requests left in the window.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.clients.len();
        self.clients.retain(|_, hits| {
            self.evict(hits, now);
            !hits.is_empty()
        });
        before - self.clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

fn insert_header(response: &mut Response, name: HeaderName, value: impl Into<HeaderValue>) {
    response.headers_mut().insert(name, value.into());
}

/// Rate-limit non-exempt routes and stamp budget metadata on every response.
pub async fn shape_request(
    Extension(state): Extension<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map(|ClientIp(ip)| *ip)
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));

    let exempt = EXEMPT_PATHS.contains(&request.uri().path());
    let decision = if exempt {
        state.limiter.peek(ip)
    } else {
        state.limiter.check(ip)
    };

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %ip, path = %request.uri().path(), "rate limit exceeded");
        ApiError::RateLimited {
            limit: decision.limit,
            window_seconds: state.limiter.window().as_secs(),
            retry_after: decision.reset_seconds(),
        }
        .into_response()
    };

    insert_header(
        &mut response,
        X_POLL_INTERVAL,
        state.monitor.poll_interval_secs(),
    );
    insert_header(&mut response, X_RATELIMIT_LIMIT, decision.limit as u64);
    insert_header(&mut response, X_RATELIMIT_REMAINING, decision.remaining as u64);
    insert_header(&mut response, X_RATELIMIT_RESET, decision.reset_seconds());
    response
}
