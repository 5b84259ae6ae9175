//! Job Listing Monitor Engine
//!
//! Periodically checks a JavaScript-rendered listing page, deduplicates what
//! it finds, and keeps the accumulated state ready for a control API.
//!
//! # Architecture
//!
//! ```text
//! Monitor ─► PollScheduler ─► CycleRunner ─┬─► SessionManager ─► BrowserLauncher
//!                                           ├─► JobExtractor
//!                                           ├─► JobStore
//!                                           └─► ActivityLog
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use monitor_engine::{Collaborators, Monitor, MonitorConfig};
//! use monitor_engine::testing::{candidates, MockExtractor, MockLauncher};
//!
//! let collaborators = Collaborators::builder()
//!     .launcher(Arc::new(MockLauncher::new()))
//!     .extractor(Arc::new(MockExtractor::returning(candidates(3))))
//!     .build();
//! let monitor = Monitor::new(MonitorConfig::default(), collaborators);
//!
//! monitor.start(Some(30));
//! let status = monitor.status();
//! ```
//!
//! # Modules
//!
//! - [`scheduler`] - Poll scheduler state machine and loop
//! - [`session`] - Browser session lifecycle, unique work dirs, Chromium backend
//! - [`store`] - Deduplicating result store
//! - [`activity_log`] - Bounded ring buffer of log entries
//! - [`extract`] - Extraction collaborator seam and default listing extractor
//! - [`testing`] - Mock implementations for testing

pub mod activity_log;
pub mod config;
pub mod cycle;
pub mod error;
pub mod extract;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod store;
pub mod testing;
pub mod types;

pub use activity_log::ActivityLog;
pub use config::{IntervalBounds, MonitorConfig, RetryPolicy, DEFAULT_TARGET_URL};
pub use cycle::CycleReport;
pub use error::{
    ErrorKind, ExtractionError, MonitorError, NotifyError, Result, SessionError, StoreError,
};
pub use extract::{Extraction, JobExtractor, ListingExtractor, PageNotice};
pub use monitor::{Collaborators, Monitor, Revisions};
pub use notify::{Notifier, NotifyQueue, TelegramNotifier};
pub use session::{
    BrowserLauncher, BrowserSession, ChromiumConfig, ChromiumLauncher, SessionHandle,
    SessionManager, WorkDirAllocator,
};
pub use store::{IngestReport, JobStore, MemoryJobStore};
pub use types::{Candidate, JobId, JobRecord, LogEntry, LogLevel, MonitorStatus, SchedulerState};
