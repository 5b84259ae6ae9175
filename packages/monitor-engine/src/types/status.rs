use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduler lifecycle state.
///
/// `Stopping` is transient: a stop was requested while a cycle was in flight
/// and the cycle is allowed to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub is_running: bool,
    pub state: SchedulerState,
    pub last_check_at: Option<DateTime<Utc>>,
    pub total_jobs_seen: u64,
    pub checks_performed: u64,
    pub errors_encountered: u64,
    pub poll_interval_seconds: u64,
    pub session_healthy: bool,
    pub target_url: String,
    /// New jobs found by the most recent successful cycle
    pub last_new_jobs: u64,
    /// Message of the most recent cycle failure, cleared on success
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    /// How often clients should poll the status endpoint
    pub recommended_poll_seconds: u64,
}
