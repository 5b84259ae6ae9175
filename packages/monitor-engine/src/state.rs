//! Process-wide monitoring state.
//!
//! One owned object shared by the scheduler, the cycle runner and the control
//! surface. Every accessor takes the lock for the duration of the call only.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::types::{MonitorStatus, SchedulerState};

#[derive(Debug)]
struct Inner {
    state: SchedulerState,
    /// Bumped on every start and stop; a loop only acts while its generation is current
    generation: u64,
    cycle_in_flight: bool,
    poll_interval_secs: u64,
    checks_performed: u64,
    errors_encountered: u64,
    last_check_at: Option<DateTime<Utc>>,
    session_healthy: bool,
    last_new_jobs: u64,
    last_error: Option<String>,
}

/// Result of asking the state machine to enter `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new loop must be spawned for this generation
    Started { generation: u64 },
    /// A loop already owns the schedule; only the interval changed
    AlreadyRunning,
}

pub struct MonitorState {
    inner: RwLock<Inner>,
    revision: AtomicU64,
    target_url: String,
    started_at: DateTime<Utc>,
}

impl MonitorState {
    pub fn new(target_url: impl Into<String>, poll_interval_secs: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: SchedulerState::Idle,
                generation: 0,
                cycle_in_flight: false,
                poll_interval_secs,
                checks_performed: 0,
                errors_encountered: 0,
                last_check_at: None,
                session_healthy: false,
                last_new_jobs: 0,
                last_error: None,
            }),
            revision: AtomicU64::new(0),
            target_url: target_url.into(),
            started_at: Utc::now(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        f(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Mutate under the write lock. The revision moves before the lock is
    /// released, so no reader sees new state under an old revision.
    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut inner);
        self.revision.fetch_add(1, Ordering::SeqCst);
        drop(inner);
        result
    }

    /// Bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.read(|s| s.state)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler_state() == SchedulerState::Running
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.read(|s| s.poll_interval_secs)
    }

    pub fn checks_performed(&self) -> u64 {
        self.read(|s| s.checks_performed)
    }

    /// Enter `Running` with `interval_secs`.
    ///
    /// From `Stopping` this starts a new generation; the old loop sees its
    /// generation go stale and exits after its cycle.
    pub fn begin_running(&self, interval_secs: u64) -> StartOutcome {
        self.write(|s| {
            s.poll_interval_secs = interval_secs;
            if s.state == SchedulerState::Running {
                return StartOutcome::AlreadyRunning;
            }
            s.state = SchedulerState::Running;
            s.generation += 1;
            StartOutcome::Started {
                generation: s.generation,
            }
        })
    }

    /// Leave `Running`. Returns false if the scheduler was not running.
    pub fn request_stop(&self) -> bool {
        self.write(|s| {
            if s.state != SchedulerState::Running {
                return false;
            }
            s.generation += 1;
            s.state = if s.cycle_in_flight {
                SchedulerState::Stopping
            } else {
                SchedulerState::Idle
            };
            true
        })
    }

    /// Whether a loop spawned for `generation` still owns the schedule.
    pub fn is_current(&self, generation: u64) -> bool {
        self.read(|s| s.state == SchedulerState::Running && s.generation == generation)
    }

    /// Mark a cycle as in flight.
    ///
    /// With `Some(generation)` this fails unless that generation is current,
    /// so a scheduled cycle can never start after a stop. `None` is used for
    /// manual checks, which run in any state.
    pub fn begin_cycle(&self, generation: Option<u64>) -> bool {
        self.write(|s| {
            let allowed = match generation {
                Some(g) => s.state == SchedulerState::Running && s.generation == g,
                None => true,
            };
            if allowed {
                s.cycle_in_flight = true;
            }
            allowed
        })
    }

    pub fn finish_cycle(&self) {
        self.write(|s| {
            s.cycle_in_flight = false;
            if s.state == SchedulerState::Stopping {
                s.state = SchedulerState::Idle;
            }
        })
    }

    pub fn record_success(&self, new_jobs: u64) {
        self.write(|s| {
            s.checks_performed += 1;
            s.last_check_at = Some(Utc::now());
            s.last_new_jobs = new_jobs;
            s.last_error = None;
        })
    }

    pub fn record_failure(&self, message: impl Into<String>) {
        let message = message.into();
        self.write(|s| {
            s.checks_performed += 1;
            s.errors_encountered += 1;
            s.last_check_at = Some(Utc::now());
            s.last_error = Some(message);
        })
    }

    pub fn set_session_healthy(&self, healthy: bool) {
        if self.read(|s| s.session_healthy) != healthy {
            self.write(|s| s.session_healthy = healthy);
        }
    }

    /// Point-in-time status. `total_jobs_seen` comes from the result store.
    pub fn snapshot(&self, total_jobs_seen: u64) -> MonitorStatus {
        self.read(|s| MonitorStatus {
            is_running: s.state == SchedulerState::Running,
            state: s.state,
            last_check_at: s.last_check_at,
            total_jobs_seen,
            checks_performed: s.checks_performed,
            errors_encountered: s.errors_encountered,
            poll_interval_seconds: s.poll_interval_secs,
            session_healthy: s.session_healthy,
            target_url: self.target_url.clone(),
            last_new_jobs: s.last_new_jobs,
            last_error: s.last_error.clone(),
            started_at: self.started_at,
            recommended_poll_seconds: s.poll_interval_secs,
        })
    }
}
