//! Bounded activity log exposed to API consumers.
//!
//! A fixed-capacity ring: once full, each append overwrites the oldest entry.
//! Every append is mirrored to `tracing` so the process log and the API log
//! tell the same story.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::types::{LogEntry, LogLevel};

struct Ring {
    slots: Vec<Option<LogEntry>>,
    /// Index the next append writes to
    head: usize,
    len: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, entry: LogEntry) {
        let cap = self.capacity();
        self.slots[self.head] = Some(entry);
        self.head = (self.head + 1) % cap;
        self.len = (self.len + 1).min(cap);
    }

    /// The newest `limit` entries, oldest first.
    fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let cap = self.capacity();
        let take = limit.min(self.len);
        let start = (self.head + cap - take) % cap;
        (0..take)
            .filter_map(|offset| self.slots[(start + offset) % cap].clone())
            .collect()
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

/// Ring buffer of timestamped, leveled messages.
pub struct ActivityLog {
    ring: RwLock<Ring>,
    revision: AtomicU64,
}

impl ActivityLog {
    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RwLock::new(Ring::with_capacity(capacity.max(1))),
            revision: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.read().unwrap_or_else(|e| e.into_inner()).capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.read().unwrap_or_else(|e| e.into_inner()).len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumped on every append or clear.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn append(&self, level: LogLevel, source: &str, message: impl Into<String>) {
        let entry = LogEntry::new(level, source, message);
        mirror(&entry);
        let mut ring = self.ring.write().unwrap_or_else(|e| e.into_inner());
        ring.push(entry);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    pub fn debug(&self, source: &str, message: impl Into<String>) {
        self.append(LogLevel::Debug, source, message);
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.append(LogLevel::Info, source, message);
    }

    pub fn warning(&self, source: &str, message: impl Into<String>) {
        self.append(LogLevel::Warning, source, message);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.append(LogLevel::Error, source, message);
    }

    pub fn success(&self, source: &str, message: impl Into<String>) {
        self.append(LogLevel::Success, source, message);
    }

    /// The newest `limit` entries in chronological order.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.ring
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .recent(limit)
    }

    pub fn clear(&self) {
        let mut ring = self.ring.write().unwrap_or_else(|e| e.into_inner());
        ring.clear();
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

fn mirror(entry: &LogEntry) {
    let source = entry.source.as_str();
    let message = entry.message.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(source, "{}", message),
        LogLevel::Info | LogLevel::Success => tracing::info!(source, "{}", message),
        LogLevel::Warning => tracing::warn!(source, "{}", message),
        LogLevel::Error => tracing::error!(source, "{}", message),
    }
}
