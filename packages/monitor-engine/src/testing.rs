//! Testing utilities including mock implementations.
//!
//! These let applications exercise the engine without launching a browser or
//! touching the network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{
    ExtractionError, ExtractionResult, NotifyError, NotifyResult, SessionError, SessionResult,
    StoreError, StoreResult,
};
use crate::extract::{Extraction, JobExtractor};
use crate::notify::Notifier;
use crate::session::{BrowserLauncher, BrowserSession, RenderedPage};
use crate::store::{IngestReport, JobStore};
use crate::types::{Candidate, JobRecord};

/// Candidate with a distinct url derived from `title`.
pub fn candidate(title: &str) -> Candidate {
    let slug: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    Candidate::new(title, "Toronto, ON", format!("https://example.com/jobs/{}", slug))
        .with_posted_label("today")
}

/// `n` distinct candidates.
pub fn candidates(n: usize) -> Vec<Candidate> {
    (1..=n).map(|i| candidate(&format!("Job {}", i))).collect()
}

/// A fake automation instance.
pub struct MockSession {
    healthy: AtomicBool,
    crash_on_render: bool,
    html: String,
    renders: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MockSession {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            healthy: AtomicBool::new(true),
            crash_on_render: false,
            html: html.into(),
            renders: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn ping(&self) -> SessionResult<()> {
        if self.is_healthy() {
            Ok(())
        } else {
            Err(SessionError::NotReady("mock session unhealthy".into()))
        }
    }

    async fn render(&self, url: &str) -> ExtractionResult<RenderedPage> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.crash_on_render {
            self.set_healthy(false);
        }
        if !self.is_healthy() {
            return Err(ExtractionError::Render {
                url: url.to_string(),
                reason: "renderer crashed".into(),
            });
        }
        Ok(RenderedPage::new(url, self.html.clone()))
    }

    async fn shutdown(&self) -> SessionResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.set_healthy(false);
        Ok(())
    }
}

/// Launcher with scripted failures that records every work dir it was given.
#[derive(Default)]
pub struct MockLauncher {
    fail_remaining: AtomicUsize,
    always_fail: bool,
    unhealthy_remaining: AtomicUsize,
    crash_on_render: bool,
    html: String,
    launched_dirs: RwLock<Vec<PathBuf>>,
    sessions: RwLock<Vec<Arc<MockSession>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` launches.
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// The first `n` launches succeed but fail their readiness check.
    pub fn with_unhealthy_launches(self, n: usize) -> Self {
        self.unhealthy_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Every session serves `html` from `render`.
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Sessions die on their first render.
    pub fn crashing_renders(mut self) -> Self {
        self.crash_on_render = true;
        self
    }

    pub fn launch_count(&self) -> usize {
        self.launched_dirs.read().unwrap().len()
    }

    pub fn launched_dirs(&self) -> Vec<PathBuf> {
        self.launched_dirs.read().unwrap().clone()
    }

    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.read().unwrap().last().cloned()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, work_dir: &Path) -> SessionResult<Arc<dyn BrowserSession>> {
        self.launched_dirs.write().unwrap().push(work_dir.to_path_buf());

        if !work_dir.is_dir() {
            return Err(SessionError::Launch(format!(
                "work dir {} was not created",
                work_dir.display()
            )));
        }
        if self.always_fail || take_one(&self.fail_remaining) {
            return Err(SessionError::Launch("scripted launch failure".into()));
        }

        let mut session = MockSession::new(self.html.clone());
        session.crash_on_render = self.crash_on_render;
        if take_one(&self.unhealthy_remaining) {
            session.set_healthy(false);
        }

        let session = Arc::new(session);
        self.sessions.write().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Scripted extraction outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Jobs(Vec<Candidate>),
    Fail(String),
}

/// Extractor that replays scripted outcomes, then repeats a fallback.
pub struct MockExtractor {
    script: RwLock<VecDeque<Scripted>>,
    fallback: Scripted,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl MockExtractor {
    fn with_fallback(fallback: Scripted) -> Self {
        Self {
            script: RwLock::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    /// Always return `candidates`.
    pub fn returning(candidates: Vec<Candidate>) -> Self {
        Self::with_fallback(Scripted::Jobs(candidates))
    }

    /// Always fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_fallback(Scripted::Fail(reason.into()))
    }

    /// Queue an outcome ahead of the fallback.
    pub fn then(self, outcome: Scripted) -> Self {
        self.script.write().unwrap().push_back(outcome);
        self
    }

    /// Simulate render time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `extract` calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExtractor for MockExtractor {
    async fn extract(
        &self,
        _session: &dyn BrowserSession,
        target_url: &str,
    ) -> ExtractionResult<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self
            .script
            .write()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Scripted::Jobs(candidates) => Ok(Extraction::new(candidates)),
            Scripted::Fail(reason) => Err(ExtractionError::Render {
                url: target_url.to_string(),
                reason,
            }),
        }
    }
}

/// Notifier that records what it was sent, optionally slow or failing.
#[derive(Default)]
pub struct MockNotifier {
    fail: bool,
    delay: Duration,
    sent: RwLock<Vec<String>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery fails after its delay.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Simulate a slow endpoint.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.sent.read().unwrap().len()
    }

    /// Titles of every job delivery was attempted for, in order.
    pub fn sent_titles(&self) -> Vec<String> {
        self.sent.read().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, job: &JobRecord) -> NotifyResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.write().unwrap().push(job.title.clone());
        if self.fail {
            return Err(NotifyError::Network("mock endpoint unreachable".into()));
        }
        Ok(())
    }
}

/// Store whose every ingest reports a duplicate-identifier violation.
pub struct CorruptStore;

#[async_trait]
impl JobStore for CorruptStore {
    async fn ingest(&self, _candidates: Vec<Candidate>) -> StoreResult<IngestReport> {
        Err(StoreError::Corruption {
            identifier: "deadbeef".into(),
        })
    }

    async fn list(&self, _limit: usize) -> StoreResult<Vec<JobRecord>> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> StoreResult<usize> {
        Ok(0)
    }

    fn total_seen(&self) -> u64 {
        0
    }

    fn revision(&self) -> u64 {
        0
    }
}
