use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use monitor_engine::{ChromiumConfig, MonitorConfig, RetryPolicy, DEFAULT_TARGET_URL};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub target_url: String,
    pub poll_interval_seconds: u64,
    pub auto_start: bool,
    pub log_capacity: usize,
    pub page_timeout_seconds: u64,
    pub render_settle_ms: u64,
    pub session_root: Option<PathBuf>,
    pub chrome_executable: Option<PathBuf>,
    pub session_max_attempts: u32,
    pub session_base_delay_ms: u64,
    pub rate_limit_requests: usize,
    pub rate_limit_window_seconds: u64,
    pub cache_ttl_status_seconds: u64,
    pub cache_ttl_jobs_seconds: u64,
    pub cache_ttl_logs_seconds: u64,
    pub allowed_origins: Vec<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            port: parse_var("PORT", 8080)?,
            target_url: non_empty("TARGET_URL").unwrap_or_else(|| DEFAULT_TARGET_URL.to_string()),
            poll_interval_seconds: parse_var("POLL_INTERVAL_SECONDS", 30)?,
            auto_start: parse_bool("AUTO_START"),
            log_capacity: parse_var("LOG_CAPACITY", 500)?,
            page_timeout_seconds: parse_var("PAGE_TIMEOUT_SECONDS", 30)?,
            render_settle_ms: parse_var("RENDER_SETTLE_MS", 3000)?,
            session_root: non_empty("SESSION_ROOT").map(PathBuf::from),
            chrome_executable: non_empty("CHROME_EXECUTABLE").map(PathBuf::from),
            session_max_attempts: parse_var("SESSION_MAX_ATTEMPTS", 3)?,
            session_base_delay_ms: parse_var("SESSION_BASE_DELAY_MS", 2000)?,
            rate_limit_requests: parse_var("RATE_LIMIT_REQUESTS", 60)?,
            rate_limit_window_seconds: parse_var("RATE_LIMIT_WINDOW_SECONDS", 60)?,
            cache_ttl_status_seconds: parse_var("CACHE_TTL_STATUS_SECONDS", 5)?,
            cache_ttl_jobs_seconds: parse_var("CACHE_TTL_JOBS_SECONDS", 10)?,
            cache_ttl_logs_seconds: parse_var("CACHE_TTL_LOGS_SECONDS", 5)?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty("TELEGRAM_CHAT_ID"),
        })
    }

    /// Engine settings derived from this configuration.
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut config = MonitorConfig::default()
            .with_target_url(self.target_url.clone())
            .with_poll_interval(self.poll_interval_seconds)
            .with_log_capacity(self.log_capacity)
            .with_page_timeout(Duration::from_secs(self.page_timeout_seconds))
            .with_retry(RetryPolicy::new(
                self.session_max_attempts,
                Duration::from_millis(self.session_base_delay_ms),
                2.0,
            ));
        if let Some(root) = &self.session_root {
            config = config.with_session_root(root.clone());
        }
        config
    }

    pub fn chromium_config(&self) -> ChromiumConfig {
        ChromiumConfig {
            executable: self.chrome_executable.clone(),
            settle_delay: Duration::from_millis(self.render_settle_ms),
            page_timeout: Duration::from_secs(self.page_timeout_seconds),
            ..ChromiumConfig::default()
        }
    }

    /// Telegram credentials, when both halves are configured.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }
}
