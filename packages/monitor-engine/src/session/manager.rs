//! Owns the single browser session of this process.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BrowserLauncher, BrowserSession, SessionHandle, SessionLease, WorkDirAllocator};
use crate::activity_log::ActivityLog;
use crate::config::RetryPolicy;
use crate::error::{SessionError, SessionResult};

const SOURCE: &str = "session";

struct ActiveSession {
    handle: SessionHandle,
    session: Arc<dyn BrowserSession>,
}

/// Provides a healthy session to the scheduler, creating and recycling as needed.
///
/// At most one session is alive at a time; the slot lock serialises creation
/// and teardown.
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    work_dirs: WorkDirAllocator,
    retry: RetryPolicy,
    ready_timeout: Duration,
    active: Mutex<Option<ActiveSession>>,
    log: Arc<ActivityLog>,
}

impl SessionManager {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        work_dirs: WorkDirAllocator,
        retry: RetryPolicy,
        ready_timeout: Duration,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            launcher,
            work_dirs,
            retry,
            ready_timeout,
            active: Mutex::new(None),
            log,
        }
    }

    /// Return a healthy session, creating one if none is alive.
    pub async fn acquire(&self) -> SessionResult<SessionLease> {
        let mut slot = self.active.lock().await;

        if let Some(active) = slot.as_mut() {
            if self.is_alive(active.session.as_ref()).await {
                active.handle.last_used_at = Utc::now();
                return Ok(SessionLease::new(
                    active.handle.clone(),
                    active.session.clone(),
                ));
            }

            self.log.warning(
                SOURCE,
                format!("Session {} failed its health check, recycling", active.handle.id),
            );
            if let Some(stale) = slot.take() {
                self.teardown(stale).await;
            }
        }

        let active = self.create_with_retry().await?;
        let lease = SessionLease::new(active.handle.clone(), active.session.clone());
        *slot = Some(active);
        Ok(lease)
    }

    /// Liveness check for the session identified by `handle`.
    ///
    /// Returns false if `handle` no longer names the active session.
    pub async fn health_check(&self, handle: &SessionHandle) -> bool {
        let session = {
            let slot = self.active.lock().await;
            match slot.as_ref() {
                Some(active) if active.handle.id == handle.id => active.session.clone(),
                _ => return false,
            }
        };
        self.is_alive(session.as_ref()).await
    }

    /// Tear down the session identified by `handle`, if it is still active.
    pub async fn release(&self, handle: &SessionHandle) {
        let mut slot = self.active.lock().await;
        if slot.as_ref().is_some_and(|a| a.handle.id == handle.id) {
            if let Some(active) = slot.take() {
                self.teardown(active).await;
            }
        }
    }

    /// Tear down whatever session is active. Used on failure and at shutdown.
    pub async fn recycle(&self) {
        let mut slot = self.active.lock().await;
        if let Some(active) = slot.take() {
            self.teardown(active).await;
        }
    }

    /// Handle of the active session, if any.
    pub async fn current(&self) -> Option<SessionHandle> {
        self.active.lock().await.as_ref().map(|a| a.handle.clone())
    }

    async fn is_alive(&self, session: &dyn BrowserSession) -> bool {
        matches!(
            tokio::time::timeout(self.ready_timeout, session.ping()).await,
            Ok(Ok(()))
        )
    }

    async fn create_with_retry(&self) -> SessionResult<ActiveSession> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.create_once().await {
                Ok(active) => {
                    self.log.success(
                        SOURCE,
                        format!(
                            "Browser session {} ready (attempt {})",
                            active.handle.id, attempt
                        ),
                    );
                    return Ok(active);
                }
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    self.log.warning(
                        SOURCE,
                        format!(
                            "Session creation attempt {} failed: {}; retrying in {}s",
                            attempt,
                            e,
                            delay.as_secs_f64()
                        ),
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.log.error(
                        SOURCE,
                        format!("Session creation failed after {} attempts: {}", attempt, e),
                    );
                    return Err(SessionError::Unavailable {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn create_once(&self) -> SessionResult<ActiveSession> {
        let work_dir = self.work_dirs.allocate().await?;

        let session = match self.launcher.launch(&work_dir).await {
            Ok(session) => session,
            Err(e) => {
                self.discard_dir(&work_dir).await;
                return Err(e);
            }
        };

        let ready = match tokio::time::timeout(self.ready_timeout, session.ping()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::NotReady(format!(
                "no response within {}s",
                self.ready_timeout.as_secs()
            ))),
        };
        if let Err(e) = ready {
            if let Err(shutdown_err) = session.shutdown().await {
                debug!(error = %shutdown_err, "shutdown after failed readiness check");
            }
            self.discard_dir(&work_dir).await;
            return Err(e);
        }

        let now = Utc::now();
        let handle = SessionHandle {
            id: Uuid::new_v4().to_string(),
            work_dir,
            created_at: now,
            last_used_at: now,
        };
        info!(session_id = %handle.id, work_dir = %handle.work_dir.display(), "browser session created");

        Ok(ActiveSession { handle, session })
    }

    async fn teardown(&self, active: ActiveSession) {
        let ActiveSession { handle, session } = active;

        if let Err(e) = session.shutdown().await {
            warn!(session_id = %handle.id, error = %e, "browser shutdown failed");
        }
        self.discard_dir(&handle.work_dir).await;
        self.log
            .info(SOURCE, format!("Browser session {} released", handle.id));
    }

    async fn discard_dir(&self, path: &std::path::Path) {
        if let Err(e) = self.work_dirs.remove(path).await {
            warn!(work_dir = %path.display(), error = %e, "failed to remove session work dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLauncher;

    fn manager(launcher: Arc<MockLauncher>) -> (SessionManager, Arc<ActivityLog>) {
        let log = Arc::new(ActivityLog::new(100));
        let root = std::env::temp_dir().join(format!("manager-test-{}", Uuid::new_v4().simple()));
        let manager = SessionManager::new(
            launcher,
            WorkDirAllocator::new(root),
            RetryPolicy::new(3, Duration::from_millis(10), 2.0),
            Duration::from_secs(1),
            log.clone(),
        );
        (manager, log)
    }

    #[tokio::test]
    async fn test_acquire_creates_once_and_reuses() {
        let launcher = Arc::new(MockLauncher::new());
        let (manager, _) = manager(launcher.clone());

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();

        assert_eq!(first.handle.id, second.handle.id);
        assert_eq!(launcher.launch_count(), 1);
        assert!(first.handle.work_dir.is_dir());
        assert!(second.handle.last_used_at >= first.handle.last_used_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let launcher = Arc::new(MockLauncher::new().failing_first(2));
        let (manager, _) = manager(launcher.clone());

        let lease = manager.acquire().await.unwrap();
        assert_eq!(launcher.launch_count(), 3);
        assert!(lease.handle.work_dir.is_dir());

        // Failed attempts must not leave directories behind
        let dirs = launcher.launched_dirs();
        assert!(!dirs[0].exists());
        assert!(!dirs[1].exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_raise_unavailable() {
        let launcher = Arc::new(MockLauncher::new().always_failing());
        let (manager, log) = manager(launcher.clone());

        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, SessionError::Unavailable { attempts: 3, .. }));
        assert_eq!(launcher.launch_count(), 3);
        assert!(manager.current().await.is_none());
        assert!(log
            .recent(10)
            .iter()
            .any(|e| e.message.contains("failed after 3 attempts")));
    }

    #[tokio::test]
    async fn test_unhealthy_session_is_replaced() {
        let launcher = Arc::new(MockLauncher::new());
        let (manager, _) = manager(launcher.clone());

        let first = manager.acquire().await.unwrap();
        launcher.last_session().unwrap().set_healthy(false);
        assert!(!manager.health_check(&first.handle).await);

        let second = manager.acquire().await.unwrap();
        assert_ne!(first.handle.id, second.handle.id);
        assert_ne!(first.handle.work_dir, second.handle.work_dir);
        assert!(!first.handle.work_dir.exists());
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_release_deletes_work_dir() {
        let launcher = Arc::new(MockLauncher::new());
        let (manager, _) = manager(launcher.clone());

        let lease = manager.acquire().await.unwrap();
        let session = launcher.last_session().unwrap();
        manager.release(&lease.handle).await;

        assert!(!lease.handle.work_dir.exists());
        assert!(manager.current().await.is_none());
        assert_eq!(session.shutdown_count(), 1);
        assert!(!manager.health_check(&lease.handle).await);
    }

    #[tokio::test]
    async fn test_release_of_stale_handle_is_ignored() {
        let launcher = Arc::new(MockLauncher::new());
        let (manager, _) = manager(launcher.clone());

        let first = manager.acquire().await.unwrap();
        manager.recycle().await;
        let second = manager.acquire().await.unwrap();

        manager.release(&first.handle).await;
        assert_eq!(manager.current().await.map(|h| h.id), Some(second.handle.id));
    }

    #[tokio::test]
    async fn test_failed_readiness_check_discards_launch() {
        let launcher = Arc::new(MockLauncher::new().with_unhealthy_launches(1));
        let (manager, _) = manager(launcher.clone());

        let lease = manager.acquire().await.unwrap();
        assert_eq!(launcher.launch_count(), 2);
        let dirs = launcher.launched_dirs();
        assert!(!dirs[0].exists());
        assert_eq!(dirs[1], lease.handle.work_dir);
    }
}
