//! Short-lived cache for read-mostly endpoints.
//!
//! Each entry is stamped with the revisions of the state it was computed
//! from. A lookup only hits when every revision still matches and the entry
//! is younger than its TTL, so a response is never older than the last
//! mutation it depends on.

use axum::{
    body::{Body, Bytes},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue},
    response::Response,
};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::server::error::ApiError;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

struct CachedResponse {
    body: Bytes,
    stamp: Vec<u64>,
    stored_at: Instant,
    ttl: Duration,
}

impl CachedResponse {
    fn is_fresh(&self, stamp: &[u64], now: Instant) -> bool {
        self.stamp == stamp && now.duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<String, CachedResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached body for `key` if it was computed at `stamp` and has not expired.
    pub fn get(&self, key: &str, stamp: &[u64]) -> Option<Bytes> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(stamp, now) {
                return Some(entry.body.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(stamp, now));
        None
    }

    pub fn put(&self, key: impl Into<String>, stamp: Vec<u64>, ttl: Duration, body: Bytes) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key.into(),
            CachedResponse {
                body,
                stamp,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn json_response(body: Bytes, cache_status: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_CACHE, HeaderValue::from_static(cache_status));
    response
}

/// Serve `key` from the cache, or compute, store and serve it.
///
/// `stamp` must be read before `compute` runs: if state moves while the
/// value is being computed, the stored entry is already stale and the next
/// request recomputes.
pub async fn cached_json<T, F, Fut>(
    cache: &ResponseCache,
    key: String,
    stamp: Vec<u64>,
    ttl: Duration,
    compute: F,
) -> Result<Response, ApiError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(body) = cache.get(&key, &stamp) {
        return Ok(json_response(body, "HIT"));
    }

    let value = compute().await?;
    let body = Bytes::from(serde_json::to_vec(&value)?);
    cache.put(key, stamp, ttl, body.clone());
    Ok(json_response(body, "MISS"))
}
