//! New-job notifications.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::activity_log::ActivityLog;
use crate::error::{NotifyError, NotifyResult};
use crate::types::JobRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Jobs buffered for delivery before new ones are dropped.
pub const NOTIFY_QUEUE_CAPACITY: usize = 256;

/// Receives each newly detected listing. Failures are reported, never fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, job: &JobRecord) -> NotifyResult<()>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Posts listings to a Telegram chat through the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    http_client: Client,
    bot_token: String,
    chat_id: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            base_url: "https://api.telegram.org".to_string(),
        }
    }

    /// Point at a different API host (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn format_message(job: &JobRecord) -> String {
        format!(
            "<b>New job posting</b>\n\n<b>{}</b>\nLocation: {}\nPosted: {}\n\n<a href=\"{}\">Apply</a>",
            escape_html(&job.title),
            escape_html(&job.location),
            escape_html(&job.posted_label),
            escape_html(&job.url),
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, job: &JobRecord) -> NotifyResult<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: Self::format_message(job),
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .http_client
            .post(format!("{}/bot{}/sendMessage", self.base_url, self.bot_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "telegram request failed");
                NotifyError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(identifier = %job.identifier, "telegram notification sent");
        Ok(())
    }
}

/// Hands new jobs to a background delivery task.
///
/// Enqueueing never waits: a check cycle is not held up by a slow or
/// unreachable notification endpoint. When the queue is full the job is
/// dropped with a warning.
#[derive(Clone)]
pub struct NotifyQueue {
    tx: mpsc::Sender<JobRecord>,
    log: Arc<ActivityLog>,
}

impl NotifyQueue {
    /// Spawn the delivery task. Must be called inside a Tokio runtime.
    ///
    /// The task exits once every `NotifyQueue` clone has been dropped and the
    /// queue is drained.
    pub fn spawn(notifier: Arc<dyn Notifier>, log: Arc<ActivityLog>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(deliver(notifier, log.clone(), rx));
        Self { tx, log }
    }

    /// Queue `job` for delivery. Returns false if it was dropped.
    pub fn enqueue(&self, job: JobRecord) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(identifier = %job.identifier, "notification queue full, dropping");
                self.log.warning(
                    "notifier",
                    format!("Notification queue full; skipped {}", job.title),
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(identifier = %job.identifier, "notification worker gone, dropping");
                false
            }
        }
    }
}

async fn deliver(
    notifier: Arc<dyn Notifier>,
    log: Arc<ActivityLog>,
    mut rx: mpsc::Receiver<JobRecord>,
) {
    while let Some(job) = rx.recv().await {
        if let Err(e) = notifier.notify(&job).await {
            warn!(identifier = %job.identifier, error = %e, "notification failed");
            log.warning("notifier", format!("Notification failed: {}", e));
        }
    }
    debug!("notification worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidates, MockNotifier};
    use crate::types::{Candidate, LogLevel};
    use chrono::Utc;

    #[test]
    fn test_message_escapes_markup() {
        let job = Candidate::new("Picker <Night> & Day", "Laval, QC", "https://example.com/j")
            .with_posted_label("today")
            .into_record(Utc::now());
        let text = TelegramNotifier::format_message(&job);
        assert!(text.contains("Picker &lt;Night&gt; &amp; Day"));
        assert!(text.contains("Location: Laval, QC"));
        assert!(text.contains("href=\"https://example.com/j\""));
    }

    #[test]
    fn test_link_is_escaped() {
        let job = Candidate::new("Picker", "Laval, QC", "https://example.com/j?a=1&b=\"2\"")
            .into_record(Utc::now());
        let text = TelegramNotifier::format_message(&job);
        assert!(text.contains("href=\"https://example.com/j?a=1&amp;b=&quot;2&quot;\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_delivers_in_background() {
        let notifier = Arc::new(MockNotifier::new().with_delay(Duration::from_secs(10)));
        let log = Arc::new(ActivityLog::new(50));
        let queue = NotifyQueue::spawn(notifier.clone(), log, 8);

        let started = tokio::time::Instant::now();
        for c in candidates(3) {
            assert!(queue.enqueue(c.into_record(Utc::now())));
        }
        assert_eq!(started.elapsed(), Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(notifier.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_with_warning() {
        let notifier = Arc::new(MockNotifier::new().with_delay(Duration::from_secs(60)));
        let log = Arc::new(ActivityLog::new(50));
        let queue = NotifyQueue::spawn(notifier.clone(), log.clone(), 1);

        let records: Vec<_> = candidates(4)
            .into_iter()
            .map(|c| c.into_record(Utc::now()))
            .collect();
        let accepted = records
            .into_iter()
            .filter(|job| queue.enqueue(job.clone()))
            .count();

        assert!(accepted < 4);
        assert!(log
            .recent(10)
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message.starts_with("Notification queue full")));
    }
}
