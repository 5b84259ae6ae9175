//! One check cycle: session → extraction → store → log.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::activity_log::ActivityLog;
use crate::error::{ExtractionError, MonitorError, Result};
use crate::extract::{Extraction, JobExtractor};
use crate::notify::NotifyQueue;
use crate::session::{SessionLease, SessionManager};
use crate::state::MonitorState;
use crate::store::JobStore;

const SOURCE: &str = "scheduler";

/// Slack on top of the page timeout for the extractor's own parsing work.
const EXTRACTION_MARGIN: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based ordinal of this check
    pub check_number: u64,
    /// Candidates the extractor returned
    pub found: usize,
    /// Candidates that were not already in the store
    pub new_jobs: usize,
}

pub struct CycleRunner {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) extractor: Arc<dyn JobExtractor>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) notifier: Option<NotifyQueue>,
    pub(crate) state: Arc<MonitorState>,
    pub(crate) log: Arc<ActivityLog>,
    pub(crate) page_timeout: Duration,
}

impl CycleRunner {
    /// Run one check and fold its outcome into the monitor state.
    ///
    /// The caller is responsible for serialising cycles.
    pub async fn run(&self) -> Result<CycleReport> {
        let check_number = self.state.checks_performed() + 1;
        self.log
            .info(SOURCE, format!("Starting job check #{}", check_number));

        match self.execute(check_number).await {
            Ok(report) => {
                self.state.record_success(report.new_jobs as u64);
                Ok(report)
            }
            Err(e) => {
                self.state.record_failure(e.to_string());
                if e.kind().is_recoverable() {
                    self.log
                        .error(SOURCE, format!("Job check #{} failed: {}", check_number, e));
                } else {
                    self.log.error(
                        SOURCE,
                        format!("FATAL: {} (check #{}); monitor halting", e, check_number),
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, check_number: u64) -> Result<CycleReport> {
        let lease = match self.sessions.acquire().await {
            Ok(lease) => {
                self.state.set_session_healthy(true);
                lease
            }
            Err(e) => {
                self.state.set_session_healthy(false);
                return Err(e.into());
            }
        };

        let extraction = self.extract(&lease).await?;
        for notice in &extraction.notices {
            self.log.append(notice.level, "extractor", notice.message.clone());
        }

        let found = extraction.candidates.len();
        if found == 0 {
            self.log.warning(SOURCE, "No listings found on the page");
        }

        let ingest = self.store.ingest(extraction.candidates).await?;
        for job in &ingest.inserted {
            self.log.success(
                SOURCE,
                format!("New job found: {} - {}", job.title, job.location),
            );
            if let Some(queue) = &self.notifier {
                queue.enqueue(job.clone());
            }
        }

        let new_jobs = ingest.new_count();
        if new_jobs > 0 {
            self.log.info(SOURCE, format!("{} new jobs found", new_jobs));
        } else {
            self.log.info(SOURCE, "No new jobs found");
        }
        info!(
            check = check_number,
            found,
            new_jobs,
            duplicates = ingest.duplicates,
            total = ingest.total,
            "job check completed"
        );

        Ok(CycleReport {
            check_number,
            found,
            new_jobs,
        })
    }

    async fn extract(&self, lease: &SessionLease) -> Result<Extraction> {
        let target = self.state.target_url();
        let ceiling = self.page_timeout + EXTRACTION_MARGIN;

        let outcome = match tokio::time::timeout(
            ceiling,
            self.extractor.extract(lease.session(), target),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExtractionError::Timeout {
                url: target.to_string(),
                seconds: ceiling.as_secs(),
            }),
        };

        match outcome {
            Ok(extraction) => Ok(extraction),
            Err(e) => {
                // A broken browser is replaced now rather than on the next acquire
                if !self.sessions.health_check(&lease.handle).await {
                    self.state.set_session_healthy(false);
                    self.log.warning(
                        "session",
                        format!("Session {} unhealthy after failed extraction", lease.handle.id),
                    );
                    self.sessions.release(&lease.handle).await;
                }
                Err(MonitorError::from(e))
            }
        }
    }
}
