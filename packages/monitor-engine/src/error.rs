//! Typed errors for the monitor engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! recoverable cycle failure from a fatal store defect.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification shared by the engine and the Control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Session creation exhausted its retries
    SessionUnavailable,
    /// The extraction collaborator failed to fetch or render the page
    ExtractionFailed,
    /// A client exceeded its request budget
    RateLimited,
    /// A poll interval outside the allowed range was supplied
    InvalidInterval,
    /// The duplicate-identifier invariant was violated
    StoreCorruption,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidInterval => "invalid_interval",
            ErrorKind::StoreCorruption => "store_corruption",
        }
    }

    /// Whether the scheduler absorbs this failure and keeps running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::StoreCorruption)
    }
}

/// Errors raised by the session lifecycle manager and browser backends.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Every creation attempt failed
    #[error("browser session unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    /// The browser process could not be started
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// The readiness check failed or timed out
    #[error("browser readiness check failed: {0}")]
    NotReady(String),

    /// The unique working directory could not be prepared or removed
    #[error("session working directory error: {0}")]
    WorkDir(#[from] std::io::Error),

    /// Teardown did not complete cleanly
    #[error("failed to shut down browser: {0}")]
    Shutdown(String),
}

/// Errors raised while fetching, rendering or parsing the monitored page.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Navigation or DOM retrieval failed
    #[error("failed to render {url}: {reason}")]
    Render { url: String, reason: String },

    /// The page did not finish within the fetch ceiling
    #[error("timed out after {seconds}s fetching {url}")]
    Timeout { url: String, seconds: u64 },

    /// The rendered document could not be interpreted
    #[error("failed to parse page: {0}")]
    Parse(String),

    /// The session went away underneath the extractor
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors raised by result store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An identifier was inserted twice; indicates a logic defect
    #[error("store corruption: identifier {identifier} inserted twice")]
    Corruption { identifier: String },
}

/// Errors raised while delivering new-job notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The notification endpoint could not be reached
    #[error("notification request failed: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status
    #[error("notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Errors surfaced by the monitor facade.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The engine has already tripped its fatal signal
    #[error("monitor halted after a fatal store error")]
    Halted,
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Session(_) => ErrorKind::SessionUnavailable,
            MonitorError::Extraction(ExtractionError::Session(_)) => {
                ErrorKind::SessionUnavailable
            }
            MonitorError::Extraction(_) => ErrorKind::ExtractionFailed,
            MonitorError::Store(StoreError::Corruption { .. }) | MonitorError::Halted => {
                ErrorKind::StoreCorruption
            }
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Result type alias for extraction operations.
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for notification delivery.
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
