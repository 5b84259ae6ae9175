//! Configuration types for the monitor engine.

use std::path::PathBuf;
use std::time::Duration;

/// Default page monitored when nothing else is configured.
pub const DEFAULT_TARGET_URL: &str = "https://hiring.amazon.ca/app#/jobsearch";

/// Inclusive bounds for the poll interval, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    pub min_seconds: u64,
    pub max_seconds: u64,
}

impl Default for IntervalBounds {
    fn default() -> Self {
        Self {
            min_seconds: 5,
            max_seconds: 300,
        }
    }
}

/// Result of fitting a requested interval into [`IntervalBounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedInterval {
    pub requested: u64,
    pub seconds: u64,
}

impl ClampedInterval {
    /// True when the request fell outside the bounds and was adjusted.
    pub fn was_clamped(&self) -> bool {
        self.requested != self.seconds
    }
}

impl IntervalBounds {
    /// Clamp a requested interval. Out-of-range values are adjusted, never rejected.
    pub fn clamp(&self, requested: u64) -> ClampedInterval {
        ClampedInterval {
            requested,
            seconds: requested.clamp(self.min_seconds, self.max_seconds),
        }
    }
}

/// Bounded retry policy for session creation.
///
/// Attempt `n` (1-based) that fails is followed by a delay of
/// `base_delay * multiplier^(n-1)` before attempt `n + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: multiplier.max(1.0),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        self.base_delay.mul_f64(self.multiplier.powi(exponent))
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Configuration for the monitor engine.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Page checked on every cycle.
    pub target_url: String,

    /// Interval used until a client supplies one. Clamped to `interval_bounds`.
    pub poll_interval_secs: u64,

    pub interval_bounds: IntervalBounds,

    /// Activity log ring capacity.
    pub log_capacity: usize,

    /// Ceiling on a single page fetch, including client-side rendering.
    pub page_timeout: Duration,

    /// Ceiling on the session readiness check.
    pub ready_timeout: Duration,

    /// Parent directory for per-session working directories.
    pub session_root: PathBuf,

    pub retry: RetryPolicy,

    /// How long shutdown waits for an in-flight cycle before releasing the session.
    pub shutdown_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            poll_interval_secs: 30,
            interval_bounds: IntervalBounds::default(),
            log_capacity: 500,
            page_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(10),
            session_root: std::env::temp_dir().join("job-monitor-sessions"),
            retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(45),
        }
    }
}

impl MonitorConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = url.into();
        self
    }

    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval_secs = seconds;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_session_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.session_root = root.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_within_bounds() {
        let bounds = IntervalBounds::default();
        let c = bounds.clamp(30);
        assert_eq!(c.seconds, 30);
        assert!(!c.was_clamped());
    }

    #[test]
    fn test_clamp_out_of_range() {
        let bounds = IntervalBounds::default();
        assert_eq!(bounds.clamp(1).seconds, 5);
        assert_eq!(bounds.clamp(0).seconds, 5);
        assert_eq!(bounds.clamp(10_000).seconds, 300);
        assert!(bounds.clamp(301).was_clamped());
    }

    #[test]
    fn test_retry_delays_are_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_retry_policy_sanitizes_input() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), 0.5);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.multiplier, 1.0);
    }
}
