//! Poll scheduler.
//!
//! # State machine
//!
//! ```text
//!            start()                     stop() with cycle in flight
//!   Idle ───────────────► Running ─────────────────────────────► Stopping
//!    ▲                       │                                      │
//!    └───── stop() ──────────┘                                      │
//!    └────────────────────── in-flight cycle finishes ◄─────────────┘
//! ```
//!
//! Each `start` from a non-running state spawns one loop task tagged with a
//! generation number. `stop` bumps the generation, so the loop finishes at
//! most its current cycle and exits. Cycles themselves (scheduled or manual)
//! are serialised by `cycle_lock`, which is what makes `restart` safe.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::activity_log::ActivityLog;
use crate::config::IntervalBounds;
use crate::cycle::{CycleReport, CycleRunner};
use crate::error::{ErrorKind, Result};
use crate::state::{MonitorState, StartOutcome};

const SOURCE: &str = "scheduler";

pub struct PollScheduler {
    state: Arc<MonitorState>,
    runner: Arc<CycleRunner>,
    cycle_lock: Arc<Mutex<()>>,
    wake: Arc<Notify>,
    fatal: CancellationToken,
    bounds: IntervalBounds,
    log: Arc<ActivityLog>,
}

impl PollScheduler {
    pub fn new(
        state: Arc<MonitorState>,
        runner: Arc<CycleRunner>,
        bounds: IntervalBounds,
        log: Arc<ActivityLog>,
        fatal: CancellationToken,
    ) -> Self {
        Self {
            state,
            runner,
            cycle_lock: Arc::new(Mutex::new(())),
            wake: Arc::new(Notify::new()),
            fatal,
            bounds,
            log,
        }
    }

    /// Clamp a requested interval into bounds, warning if it had to move.
    pub fn clamp_interval(&self, requested: u64) -> u64 {
        let clamped = self.bounds.clamp(requested);
        if clamped.was_clamped() {
            self.log.warning(
                SOURCE,
                format!(
                    "Poll interval {}s outside [{}, {}]; using {}s",
                    requested, self.bounds.min_seconds, self.bounds.max_seconds, clamped.seconds
                ),
            );
        }
        clamped.seconds
    }

    /// Enter `Running`. The first cycle runs immediately.
    ///
    /// Already running: only the interval is updated and the pending wait is
    /// re-armed with it.
    pub fn start(&self, interval_secs: Option<u64>) {
        if self.fatal.is_cancelled() {
            self.log
                .error(SOURCE, "Monitor halted after a fatal error; start ignored");
            return;
        }

        let seconds = match interval_secs {
            Some(requested) => self.clamp_interval(requested),
            None => self.state.poll_interval_secs(),
        };
        let previous = self.state.poll_interval_secs();

        match self.state.begin_running(seconds) {
            StartOutcome::Started { generation } => {
                self.log.success(
                    SOURCE,
                    format!("Monitoring started (interval {}s)", seconds),
                );
                self.spawn_loop(generation);
            }
            StartOutcome::AlreadyRunning => {
                if previous != seconds {
                    self.log
                        .info(SOURCE, format!("Poll interval updated to {}s", seconds));
                    self.wake.notify_waiters();
                } else {
                    debug!("start requested while already running");
                }
            }
        }
    }

    /// Leave `Running`. An in-flight cycle is allowed to finish.
    pub fn stop(&self) {
        if self.state.request_stop() {
            self.log.info(SOURCE, "Monitoring stopped");
            self.wake.notify_waiters();
        } else {
            debug!("stop requested while not running");
        }
    }

    /// `stop` then `start`, without ever overlapping two cycles.
    pub fn restart(&self, interval_secs: Option<u64>) {
        self.log.info(SOURCE, "Restarting monitor");
        self.stop();
        self.start(interval_secs);
    }

    /// Run one cycle now, waiting for any in-flight cycle first.
    pub async fn check_now(&self) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;
        self.state.begin_cycle(None);
        let outcome = self.runner.run().await;
        self.state.finish_cycle();
        settle(&outcome, &self.state, &self.fatal);
        outcome
    }

    /// Wait up to `grace` for an in-flight cycle to finish.
    ///
    /// Returns false if the cycle was still running when `grace` ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.cycle_lock.lock())
            .await
            .is_ok()
    }

    fn spawn_loop(&self, generation: u64) {
        let task = LoopTask {
            generation,
            state: self.state.clone(),
            runner: self.runner.clone(),
            cycle_lock: self.cycle_lock.clone(),
            wake: self.wake.clone(),
            fatal: self.fatal.clone(),
        };
        tokio::spawn(task.run());
    }
}

/// Trip the fatal signal on unrecoverable cycle errors.
fn settle(outcome: &Result<CycleReport>, state: &MonitorState, fatal: &CancellationToken) {
    if let Err(e) = outcome {
        if e.kind() == ErrorKind::StoreCorruption {
            error!(error = %e, "store corruption detected, halting monitor");
            state.request_stop();
            fatal.cancel();
        }
    }
}

struct LoopTask {
    generation: u64,
    state: Arc<MonitorState>,
    runner: Arc<CycleRunner>,
    cycle_lock: Arc<Mutex<()>>,
    wake: Arc<Notify>,
    fatal: CancellationToken,
}

impl LoopTask {
    async fn run(self) {
        info!(generation = self.generation, "poll loop started");

        loop {
            let finished_at = {
                let _guard = self.cycle_lock.lock().await;
                if !self.state.begin_cycle(Some(self.generation)) {
                    break;
                }
                let outcome = self.runner.run().await;
                self.state.finish_cycle();
                settle(&outcome, &self.state, &self.fatal);
                Instant::now()
            };

            if !self.wait_for_next(finished_at).await {
                break;
            }
        }

        info!(generation = self.generation, "poll loop exited");
    }

    /// Sleep until the next cycle is due. Returns false if the loop should exit.
    async fn wait_for_next(&self, finished_at: Instant) -> bool {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before checking so a stop between the check and the
            // select cannot be missed
            notified.as_mut().enable();

            if !self.state.is_current(self.generation) || self.fatal.is_cancelled() {
                return false;
            }

            let deadline = finished_at + Duration::from_secs(self.state.poll_interval_secs());
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                _ = &mut notified => continue,
                _ = self.fatal.cancelled() => return false,
            }
        }
    }
}
