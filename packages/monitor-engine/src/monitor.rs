//! The engine's public face: one handle behind which the scheduler, session
//! manager, result store and activity log are wired together.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use crate::activity_log::ActivityLog;
use crate::config::MonitorConfig;
use crate::cycle::{CycleReport, CycleRunner};
use crate::error::{MonitorError, Result};
use crate::extract::JobExtractor;
use crate::notify::{Notifier, NotifyQueue, NOTIFY_QUEUE_CAPACITY};
use crate::scheduler::PollScheduler;
use crate::session::{BrowserLauncher, SessionManager, WorkDirAllocator};
use crate::state::MonitorState;
use crate::store::{JobStore, MemoryJobStore};
use crate::types::{JobRecord, LogEntry, MonitorStatus};

const SOURCE: &str = "monitor";

/// Pluggable pieces the engine is assembled from.
#[derive(TypedBuilder)]
pub struct Collaborators {
    launcher: Arc<dyn BrowserLauncher>,
    extractor: Arc<dyn JobExtractor>,
    #[builder(default = Arc::new(MemoryJobStore::new()))]
    store: Arc<dyn JobStore>,
    #[builder(default, setter(strip_option))]
    notifier: Option<Arc<dyn Notifier>>,
}

/// Revisions of everything a cached response can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revisions {
    pub state: u64,
    pub store: u64,
    pub log: u64,
}

pub struct Monitor {
    config: MonitorConfig,
    state: Arc<MonitorState>,
    store: Arc<dyn JobStore>,
    log: Arc<ActivityLog>,
    sessions: Arc<SessionManager>,
    scheduler: PollScheduler,
    fatal: CancellationToken,
}

impl Monitor {
    /// Wire the engine together. With a notifier configured this spawns the
    /// delivery task, so it must be called inside a Tokio runtime.
    pub fn new(config: MonitorConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            launcher,
            extractor,
            store,
            notifier,
        } = collaborators;

        let log = Arc::new(ActivityLog::new(config.log_capacity));
        let initial = config.interval_bounds.clamp(config.poll_interval_secs);
        if initial.was_clamped() {
            log.warning(
                SOURCE,
                format!(
                    "Configured poll interval {}s out of range; using {}s",
                    initial.requested, initial.seconds
                ),
            );
        }

        let state = Arc::new(MonitorState::new(config.target_url.clone(), initial.seconds));
        let sessions = Arc::new(SessionManager::new(
            launcher,
            WorkDirAllocator::new(config.session_root.clone()),
            config.retry.clone(),
            config.ready_timeout,
            log.clone(),
        ));
        let runner = Arc::new(CycleRunner {
            sessions: sessions.clone(),
            extractor,
            store: store.clone(),
            notifier: notifier
                .map(|notifier| NotifyQueue::spawn(notifier, log.clone(), NOTIFY_QUEUE_CAPACITY)),
            state: state.clone(),
            log: log.clone(),
            page_timeout: config.page_timeout,
        });
        let fatal = CancellationToken::new();
        let scheduler = PollScheduler::new(
            state.clone(),
            runner,
            config.interval_bounds,
            log.clone(),
            fatal.clone(),
        );

        log.info(SOURCE, format!("Monitor ready for {}", config.target_url));

        Self {
            config,
            state,
            store,
            log,
            sessions,
            scheduler,
            fatal,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn status(&self) -> MonitorStatus {
        self.state.snapshot(self.store.total_seen())
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.state.poll_interval_secs()
    }

    pub fn revisions(&self) -> Revisions {
        Revisions {
            state: self.state.revision(),
            store: self.store.revision(),
            log: self.log.revision(),
        }
    }

    /// Cancelled once the engine hits an unrecoverable error.
    pub fn fatal_token(&self) -> CancellationToken {
        self.fatal.clone()
    }

    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        Ok(self.store.list(limit).await?)
    }

    pub fn start(&self, interval_secs: Option<u64>) -> MonitorStatus {
        self.scheduler.start(interval_secs);
        self.status()
    }

    pub fn stop(&self) -> MonitorStatus {
        self.scheduler.stop();
        self.status()
    }

    pub fn restart(&self, interval_secs: Option<u64>) -> MonitorStatus {
        self.scheduler.restart(interval_secs);
        self.status()
    }

    /// Run one cycle on demand, serialised with scheduled cycles.
    pub async fn check_now(&self) -> Result<CycleReport> {
        if self.fatal.is_cancelled() {
            return Err(MonitorError::Halted);
        }
        self.scheduler.check_now().await
    }

    /// Empty the result store. Counters other than the job total are kept.
    pub async fn clear_jobs(&self) -> Result<usize> {
        let cleared = self.store.clear().await?;
        self.log.info(SOURCE, format!("Cleared {} jobs", cleared));
        Ok(cleared)
    }

    /// The most recent `limit` entries, oldest first.
    pub fn logs(&self, limit: usize) -> Vec<LogEntry> {
        self.log.recent(limit)
    }

    pub fn log_capacity(&self) -> usize {
        self.log.capacity()
    }

    pub fn clear_logs(&self) {
        self.log.clear();
        self.log.info(SOURCE, "Logs cleared");
    }

    /// Liveness of the current session without creating one.
    pub async fn session_healthy(&self) -> bool {
        match self.sessions.current().await {
            Some(handle) => self.sessions.health_check(&handle).await,
            None => false,
        }
    }

    /// Stop scheduling, wait (bounded) for the in-flight cycle, release the session.
    pub async fn shutdown(&self) {
        self.scheduler.stop();
        if !self.scheduler.drain(self.config.shutdown_grace).await {
            warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "in-flight cycle still running at shutdown"
            );
        }
        self.sessions.recycle().await;
        info!("monitor shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidates, CorruptStore, MockExtractor, MockLauncher, MockNotifier};
    use crate::types::LogLevel;
    use std::time::Duration;

    fn config() -> MonitorConfig {
        let root = std::env::temp_dir().join(format!("monitor-test-{}", uuid::Uuid::new_v4().simple()));
        MonitorConfig::default()
            .with_session_root(root)
            .with_shutdown_grace(Duration::from_secs(5))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn monitor(extractor: MockExtractor) -> (Monitor, Arc<MockLauncher>) {
        let launcher = Arc::new(MockLauncher::new());
        let collaborators = Collaborators::builder()
            .launcher(launcher.clone())
            .extractor(Arc::new(extractor))
            .build();
        (Monitor::new(config(), collaborators), launcher)
    }

    #[tokio::test]
    async fn test_clear_jobs_logs_and_keeps_counters() {
        let (monitor, _) = monitor(MockExtractor::returning(candidates(10)));
        monitor.check_now().await.unwrap();

        assert_eq!(monitor.clear_jobs().await.unwrap(), 10);
        let status = monitor.status();
        assert_eq!(status.total_jobs_seen, 0);
        assert_eq!(status.checks_performed, 1);
        assert!(monitor.list_jobs(50).await.unwrap().is_empty());
        assert_eq!(monitor.logs(1)[0].message, "Cleared 10 jobs");
    }

    #[tokio::test]
    async fn test_clear_logs_leaves_one_entry() {
        let (monitor, _) = monitor(MockExtractor::returning(Vec::new()));
        monitor.check_now().await.unwrap();
        assert!(monitor.logs(100).len() > 1);

        monitor.clear_logs();
        let logs = monitor.logs(100);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "Logs cleared");
        assert_eq!(logs[0].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_revisions_move_with_state() {
        let (monitor, _) = monitor(MockExtractor::returning(candidates(2)));
        let before = monitor.revisions();
        monitor.check_now().await.unwrap();
        let after = monitor.revisions();

        assert!(after.store > before.store);
        assert!(after.state > before.state);
        assert!(after.log > before.log);
    }

    #[tokio::test]
    async fn test_shutdown_releases_session() {
        let (monitor, launcher) = monitor(MockExtractor::returning(candidates(1)));
        monitor.check_now().await.unwrap();
        assert!(monitor.session_healthy().await);

        monitor.shutdown().await;
        let dirs = launcher.launched_dirs();
        assert!(!dirs[0].exists());
        assert_eq!(launcher.last_session().unwrap().shutdown_count(), 1);
        assert!(!monitor.session_healthy().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_corruption_halts_monitor() {
        let collaborators = Collaborators::builder()
            .launcher(Arc::new(MockLauncher::new()))
            .extractor(Arc::new(MockExtractor::returning(candidates(2))))
            .store(Arc::new(CorruptStore))
            .build();
        let monitor = Monitor::new(config(), collaborators);

        monitor.start(Some(5));
        let fatal = monitor.fatal_token();
        wait_for(|| fatal.is_cancelled()).await;

        let status = monitor.status();
        assert!(!status.is_running);
        assert_eq!(status.errors_encountered, 1);

        // Halted for good: start is ignored and manual checks are refused
        assert!(!monitor.start(Some(5)).is_running);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(monitor.status().checks_performed, 1);
        assert!(matches!(monitor.check_now().await, Err(MonitorError::Halted)));
        assert!(monitor
            .logs(20)
            .iter()
            .any(|e| e.level == LogLevel::Error && e.message.contains("start ignored")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_notifier_keeps_cadence() {
        let notifier = Arc::new(MockNotifier::new().failing().with_delay(Duration::from_secs(10)));
        let collaborators = Collaborators::builder()
            .launcher(Arc::new(MockLauncher::new()))
            .extractor(Arc::new(MockExtractor::returning(candidates(50))))
            .notifier(notifier.clone())
            .build();
        let monitor = Monitor::new(config(), collaborators);

        monitor.start(Some(5));
        tokio::time::sleep(Duration::from_secs(12)).await;
        let status = monitor.status();
        assert!(status.checks_performed >= 2);
        assert_eq!(status.total_jobs_seen, 50);

        // A manual check is not stuck behind deliveries
        let started = tokio::time::Instant::now();
        monitor.check_now().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));

        monitor.shutdown().await;
        assert!(notifier.calls() < 50);
    }
}
