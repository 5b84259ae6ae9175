//! In-memory result store.

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{IngestReport, JobStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{Candidate, JobId, JobRecord};

/// Insertion-ordered map of records keyed by identifier.
///
/// The lock is held only for the duration of one call and never across an
/// await point.
pub struct MemoryJobStore {
    records: RwLock<IndexMap<JobId, JobRecord>>,
    total_seen: AtomicU64,
    revision: AtomicU64,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
            total_seen: AtomicU64::new(0),
            revision: AtomicU64::new(0),
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ingest(&self, candidates: Vec<Candidate>) -> StoreResult<IngestReport> {
        let detected_at = Utc::now();
        let mut report = IngestReport::default();

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        for candidate in candidates {
            let id = candidate.identifier();
            if records.contains_key(&id) {
                report.duplicates += 1;
                continue;
            }

            let record = candidate.into_record(detected_at);
            if records.insert(id.clone(), record.clone()).is_some() {
                return Err(StoreError::Corruption {
                    identifier: id.to_string(),
                });
            }
            report.inserted.push(record);
        }
        report.total = records.len();

        if !report.inserted.is_empty() {
            self.total_seen
                .fetch_add(report.inserted.len() as u64, Ordering::SeqCst);
            self.revision.fetch_add(1, Ordering::SeqCst);
        }
        drop(records);

        Ok(report)
    }

    async fn list(&self, limit: usize) -> StoreResult<Vec<JobRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().rev().take(limit).cloned().collect())
    }

    async fn clear(&self) -> StoreResult<usize> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let cleared = records.len();
        records.clear();
        self.total_seen.store(0, Ordering::SeqCst);
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(cleared)
    }

    fn total_seen(&self) -> u64 {
        self.total_seen.load(Ordering::SeqCst)
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}
