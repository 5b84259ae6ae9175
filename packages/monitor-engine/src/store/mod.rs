//! Result store abstraction.
//!
//! The engine only needs idempotent upsert-by-identifier and retrieval ordered
//! by detection time. [`MemoryJobStore`] is the in-process implementation;
//! durable backends implement [`JobStore`] the same way.

pub mod memory;

pub use memory::MemoryJobStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{Candidate, JobRecord};

/// Outcome of folding one cycle's candidates into the store.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Records inserted by this call, in insertion order
    pub inserted: Vec<JobRecord>,
    /// Candidates skipped because their identifier was already present
    pub duplicates: usize,
    /// Records held after the call
    pub total: usize,
}

impl IngestReport {
    pub fn new_count(&self) -> usize {
        self.inserted.len()
    }
}

/// Deduplicated accumulation of listings.
///
/// Implementations must apply a whole `ingest` batch atomically: readers see
/// either none or all of one call's inserts.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert every candidate whose identifier is not yet present.
    ///
    /// Re-ingesting a known candidate is a no-op. The first-seen version of a
    /// listing is authoritative; later variants are discarded.
    async fn ingest(&self, candidates: Vec<Candidate>) -> StoreResult<IngestReport>;

    /// Up to `limit` records, most recently detected first.
    async fn list(&self, limit: usize) -> StoreResult<Vec<JobRecord>>;

    /// Remove everything, returning how many records were dropped.
    async fn clear(&self) -> StoreResult<usize>;

    /// Number of records inserted since the last clear.
    fn total_seen(&self) -> u64;

    /// Bumped on every mutation.
    fn revision(&self) -> u64;
}
