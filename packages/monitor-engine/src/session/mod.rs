//! Browser-automation session lifecycle.
//!
//! # Architecture
//!
//! ```text
//! SessionManager::acquire()
//!     │
//!     ├─► active session healthy? ──► lease it
//!     │
//!     └─► otherwise: tear down, then up to N attempts of
//!             WorkDirAllocator::allocate() ─► BrowserLauncher::launch() ─► ping()
//!         with exponential backoff between attempts
//! ```
//!
//! The automation technology sits behind [`BrowserLauncher`] and
//! [`BrowserSession`]; [`ChromiumLauncher`] drives headless Chromium over CDP.

pub mod chromium;
pub mod manager;
pub mod workdir;

pub use chromium::{ChromiumConfig, ChromiumLauncher};
pub use manager::SessionManager;
pub use workdir::WorkDirAllocator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ExtractionResult, SessionResult};

/// A page rendered by a live session.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL that was requested
    pub url: String,
    /// Serialized DOM after client-side rendering settled
    pub html: String,
    pub fetched_at: DateTime<Utc>,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// A live automation instance.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Cheap readiness / liveness check.
    async fn ping(&self) -> SessionResult<()>;

    /// Navigate to `url` and return the rendered DOM.
    async fn render(&self, url: &str) -> ExtractionResult<RenderedPage>;

    /// Stop the automation instance. Must be safe to call more than once.
    async fn shutdown(&self) -> SessionResult<()>;
}

/// Starts automation instances bound to a working directory.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch an instance that keeps all on-disk state under `work_dir`.
    async fn launch(&self, work_dir: &Path) -> SessionResult<Arc<dyn BrowserSession>>;
}

/// Identity of the session currently owned by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub id: String,
    pub work_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Borrowed access to the active session for the duration of one cycle.
#[derive(Clone)]
pub struct SessionLease {
    pub handle: SessionHandle,
    session: Arc<dyn BrowserSession>,
}

impl SessionLease {
    pub(crate) fn new(handle: SessionHandle, session: Arc<dyn BrowserSession>) -> Self {
        Self { handle, session }
    }

    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
