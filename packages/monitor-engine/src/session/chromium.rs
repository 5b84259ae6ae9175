//! Headless Chromium backend driven over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserLauncher, BrowserSession, RenderedPage};
use crate::error::{ExtractionError, ExtractionResult, SessionError, SessionResult};

/// Flags that keep a container-hosted browser in a single, quiet process mode.
const STABILITY_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--disable-crash-reporter",
    "--disable-breakpad",
    "--log-level=3",
];

#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Browser binary; auto-detected when `None`
    pub executable: Option<PathBuf>,
    /// Wait after navigation for client-side rendering to settle
    pub settle_delay: Duration,
    /// Ceiling on a single navigation
    pub page_timeout: Duration,
    pub launch_timeout: Duration,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            executable: None,
            settle_delay: Duration::from_millis(3000),
            page_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(20),
        }
    }
}

pub struct ChromiumLauncher {
    config: ChromiumConfig,
}

impl ChromiumLauncher {
    pub fn new(config: ChromiumConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self, work_dir: &Path) -> SessionResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(work_dir)
            .no_sandbox()
            .request_timeout(self.config.page_timeout)
            .launch_timeout(self.config.launch_timeout);

        for arg in STABILITY_ARGS {
            builder = builder.arg(*arg);
        }
        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }

        builder.build().map_err(SessionError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, work_dir: &Path) -> SessionResult<Arc<dyn BrowserSession>> {
        let config = self.browser_config(work_dir)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        // The handler stream must be polled for the connection to make progress
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools handler error");
                }
            }
        });

        debug!(work_dir = %work_dir.display(), "chromium launched");

        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(Some(browser)),
            events,
            settle_delay: self.config.settle_delay,
            page_timeout: self.config.page_timeout,
        }))
    }
}

pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    events: JoinHandle<()>,
    settle_delay: Duration,
    page_timeout: Duration,
}

impl ChromiumSession {
    async fn load(&self, url: &str) -> ExtractionResult<String> {
        let render_err = |reason: String| ExtractionError::Render {
            url: url.to_string(),
            reason,
        };

        let page = {
            let guard = self.browser.lock().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| render_err("session already shut down".into()))?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| render_err(e.to_string()))?
        };

        let result = async {
            page.goto(url).await.map_err(|e| render_err(e.to_string()))?;
            tokio::time::sleep(self.settle_delay).await;
            page.content().await.map_err(|e| render_err(e.to_string()))
        }
        .await;

        if let Err(e) = page.close().await {
            warn!(url = %url, error = %e, "failed to close page");
        }
        result
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn ping(&self) -> SessionResult<()> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| SessionError::NotReady("session already shut down".into()))?;
        browser
            .version()
            .await
            .map(|_| ())
            .map_err(|e| SessionError::NotReady(e.to_string()))
    }

    async fn render(&self, url: &str) -> ExtractionResult<RenderedPage> {
        let ceiling = self.page_timeout + self.settle_delay;
        let html = tokio::time::timeout(ceiling, self.load(url))
            .await
            .map_err(|_| ExtractionError::Timeout {
                url: url.to_string(),
                seconds: ceiling.as_secs(),
            })??;
        Ok(RenderedPage::new(url, html))
    }

    async fn shutdown(&self) -> SessionResult<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Shutdown(e.to_string()));
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "waiting for chromium to exit failed");
        }
        self.events.abort();
        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.events.abort();
    }
}
