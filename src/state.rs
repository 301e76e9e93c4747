//! Chunk bookkeeping shared by the fetch workers.
//!
//! A download is described by one [`ChunkSpec`] per planned byte range. Workers
//! record their results in a [`ChunkLedger`], which holds the completed and
//! failed sets behind a mutex so concurrent fetches can update it safely.
use crate::error::ChunkError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// A byte range within the remote resource.
///
/// `end` is the inclusive last byte. `None` leaves the range open so the
/// server sends everything from `start` to the end of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
    /// Set for bounded ranges that hold no bytes at all (resource smaller
    /// than the chunk count).
    pub empty: bool,
}

impl ByteRange {
    pub fn bounded(start: u64, len: u64) -> Self {
        if len == 0 {
            ByteRange {
                start,
                end: Some(start),
                empty: true,
            }
        } else {
            ByteRange {
                start,
                end: Some(start + len - 1),
                empty: false,
            }
        }
    }

    pub fn open(start: u64) -> Self {
        ByteRange {
            start,
            end: None,
            empty: false,
        }
    }

    /// Value for the HTTP `Range` request header.
    pub fn header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }

    /// Number of bytes covered, `None` for an open range.
    pub fn len(&self) -> Option<u64> {
        if self.empty {
            return Some(0);
        }
        self.end.map(|end| end - self.start + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

/// One planned chunk: where to fetch it from, which bytes, and where to put them.
///
/// Two specs are the same chunk when url, part path and range agree; the
/// index only records plan order.
#[derive(Debug, Clone)]
pub struct ChunkSpec {
    pub index: usize,
    pub url: String,
    pub part_path: PathBuf,
    pub range: ByteRange,
}

impl PartialEq for ChunkSpec {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.part_path == other.part_path && self.range == other.range
    }
}

impl Eq for ChunkSpec {}

impl std::hash::Hash for ChunkSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.part_path.hash(state);
        self.range.hash(state);
    }
}

/// Result of fetching one chunk.
#[derive(Debug)]
pub enum ChunkOutcome {
    Completed(ChunkSpec),
    Failed(ChunkSpec, ChunkError),
}

impl ChunkOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ChunkOutcome::Completed(_))
    }

    pub fn spec(&self) -> &ChunkSpec {
        match self {
            ChunkOutcome::Completed(spec) | ChunkOutcome::Failed(spec, _) => spec,
        }
    }
}

#[derive(Debug, Default)]
struct LedgerSets {
    completed: HashSet<ChunkSpec>,
    /// Failed chunks with the message of their last error.
    failed: HashMap<ChunkSpec, String>,
}

/// Completed and failed chunk sets, shared between concurrent workers.
///
/// A chunk is never in both sets: completing it clears any failed entry and
/// failing an already completed chunk is ignored.
#[derive(Debug, Default)]
pub struct ChunkLedger {
    sets: Mutex<LedgerSets>,
}

impl ChunkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_completed(&self, spec: &ChunkSpec) -> bool {
        self.sets.lock().await.completed.contains(spec)
    }

    pub async fn mark_completed(&self, spec: &ChunkSpec) {
        let mut sets = self.sets.lock().await;
        sets.failed.remove(spec);
        sets.completed.insert(spec.clone());
    }

    pub async fn mark_failed(&self, spec: &ChunkSpec, error: &ChunkError) {
        let mut sets = self.sets.lock().await;
        if !sets.completed.contains(spec) {
            sets.failed.insert(spec.clone(), error.to_string());
        }
    }

    /// Drops a stale failed entry; returns whether one was present.
    pub async fn clear_failed(&self, spec: &ChunkSpec) -> bool {
        self.sets.lock().await.failed.remove(spec).is_some()
    }

    /// Empties the failed set and returns what it held, in plan order.
    pub async fn take_failed(&self) -> Vec<ChunkSpec> {
        let failed = std::mem::take(&mut self.sets.lock().await.failed);
        let mut specs: Vec<ChunkSpec> = failed.into_keys().collect();
        specs.sort_by_key(|spec| spec.index);
        specs
    }

    /// Currently failed chunks with their last error message, in plan order.
    pub async fn failed(&self) -> Vec<(ChunkSpec, String)> {
        let sets = self.sets.lock().await;
        let mut failed: Vec<(ChunkSpec, String)> = sets
            .failed
            .iter()
            .map(|(spec, err)| (spec.clone(), err.clone()))
            .collect();
        failed.sort_by_key(|(spec, _)| spec.index);
        failed
    }

    /// Currently failed chunks in plan order, leaving the set untouched.
    pub async fn failed_specs(&self) -> Vec<ChunkSpec> {
        self.failed().await.into_iter().map(|(spec, _)| spec).collect()
    }

    pub async fn failed_count(&self) -> usize {
        self.sets.lock().await.failed.len()
    }

    pub async fn completed_count(&self) -> usize {
        self.sets.lock().await.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(index: usize) -> ChunkSpec {
        ChunkSpec {
            index,
            url: "http://example.com/file.bin".to_string(),
            part_path: PathBuf::from(format!("/tmp/file.bin.part{index}")),
            range: ByteRange::bounded(index as u64 * 10, 10),
        }
    }

    fn transport_error() -> ChunkError {
        ChunkError::Aborted {
            reason: "connection reset".into(),
        }
    }

    #[test]
    fn range_headers() {
        assert_eq!(ByteRange::bounded(0, 10).header(), "bytes=0-9");
        assert_eq!(ByteRange::open(90).header(), "bytes=90-");
        assert_eq!(ByteRange::bounded(20, 10).len(), Some(10));
        assert_eq!(ByteRange::open(20).len(), None);
        assert!(ByteRange::bounded(3, 0).is_empty());
        assert_eq!(ByteRange::bounded(3, 0).len(), Some(0));
    }

    #[test]
    fn identity_ignores_index() {
        let a = spec(1);
        let mut b = spec(1);
        b.index = 7;
        assert_eq!(a, b);

        let mut c = spec(1);
        c.url = "http://example.com/other.bin".into();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn completing_clears_failed_entry() {
        let ledger = ChunkLedger::new();
        let chunk = spec(0);

        ledger.mark_failed(&chunk, &transport_error()).await;
        assert_eq!(ledger.failed_count().await, 1);

        ledger.mark_completed(&chunk).await;
        assert_eq!(ledger.failed_count().await, 0);
        assert!(ledger.is_completed(&chunk).await);
    }

    #[tokio::test]
    async fn completed_chunk_is_never_marked_failed() {
        let ledger = ChunkLedger::new();
        let chunk = spec(2);

        ledger.mark_completed(&chunk).await;
        ledger.mark_failed(&chunk, &transport_error()).await;

        assert_eq!(ledger.failed_count().await, 0);
        assert_eq!(ledger.completed_count().await, 1);
    }

    #[tokio::test]
    async fn take_failed_snapshots_and_clears_in_plan_order() {
        let ledger = ChunkLedger::new();
        for index in [3, 0, 2] {
            ledger.mark_failed(&spec(index), &transport_error()).await;
        }

        let taken = ledger.take_failed().await;
        let indices: Vec<usize> = taken.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
        assert_eq!(ledger.failed_count().await, 0);
    }

    #[tokio::test]
    async fn failed_keeps_last_error_message() {
        let ledger = ChunkLedger::new();
        ledger.mark_failed(&spec(1), &transport_error()).await;

        let failed = ledger.failed().await;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].1.contains("connection reset"));
    }
}
