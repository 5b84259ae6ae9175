//! Extraction collaborator seam.
//!
//! An extractor turns the monitored page into listing candidates. Zero
//! results is a normal outcome; only a genuine fetch or render failure is an
//! error.

pub mod listing;

pub use listing::{parse_listing, ListingExtractor};

use async_trait::async_trait;

use crate::error::ExtractionResult;
use crate::session::BrowserSession;
use crate::types::{Candidate, LogLevel};

/// Human-readable observation about the page, surfaced in the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNotice {
    pub level: LogLevel,
    pub message: String,
}

impl PageNotice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }
}

/// What one extraction produced.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub candidates: Vec<Candidate>,
    pub notices: Vec<PageNotice>,
}

impl Extraction {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            notices: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[async_trait]
pub trait JobExtractor: Send + Sync {
    /// Load `target_url` through `session` and return the listings found.
    async fn extract(
        &self,
        session: &dyn BrowserSession,
        target_url: &str,
    ) -> ExtractionResult<Extraction>;
}
