//! Snapshot storage and retrieval

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;

use crate::config::TierTable;
use crate::snapshot::{CacheKey, Snapshot};

type SnapshotMap = HashMap<CacheKey, Arc<Snapshot>>;

/// Cache counters as reported in the scheduler status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub valid_entries: usize,
    pub total_entries: usize,
}

/// In-memory snapshot cache
///
/// Entries are never evicted: a stale entry stays in the map until a newer capture
/// overwrites it, and staleness is decided per read against the caller's `max_age`.
/// The key space is the tracked set, so the map stays bounded.
#[derive(Debug)]
pub struct SnapshotCache {
    snapshots: RwLock<SnapshotMap>,
    tiers: TierTable,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SnapshotCache {
    /// Create a cache judging `stats().valid_entries` against `tiers`
    pub fn new(tiers: TierTable) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            tiers,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // Whole `Arc<Snapshot>` values are swapped in, so a poisoned lock still guards a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, SnapshotMap> {
        self.snapshots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SnapshotMap> {
        self.snapshots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a snapshot, replacing whatever was there
    pub fn put(&self, key: CacheKey, snapshot: Arc<Snapshot>) {
        self.write().insert(key, snapshot);
    }

    /// Store a snapshot unless the current entry was captured strictly later
    ///
    /// Returns `false` when the incoming snapshot was discarded.
    pub fn put_if_newer(&self, key: CacheKey, snapshot: Arc<Snapshot>) -> bool {
        let mut snapshots = self.write();
        match snapshots.get(&key) {
            Some(current) if current.timestamp > snapshot.timestamp => false,
            _ => {
                snapshots.insert(key, snapshot);
                true
            }
        }
    }

    /// Get the snapshot for `key` if it is valid for `max_age`
    ///
    /// Counts a hit only when a snapshot is returned; absent and stale both count as misses.
    pub fn get(&self, key: &CacheKey, max_age: Duration) -> Option<Arc<Snapshot>> {
        let found = self
            .read()
            .get(key)
            .filter(|snapshot| snapshot.is_valid(max_age))
            .cloned();

        match found {
            Some(snapshot) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(snapshot)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Get the stored snapshot regardless of age or error, without touching counters
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        self.read().get(key).cloned()
    }

    /// Counters plus a fresh count of entries still inside their tier ttl
    pub fn stats(&self) -> CacheStats {
        let snapshots = self.read();
        let valid_entries = snapshots
            .values()
            .filter(|snapshot| snapshot.is_valid(self.tiers.ttl(snapshot.timeframe)))
            .count();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            valid_entries,
            total_entries: snapshots.len(),
        }
    }

    /// Number of stored entries, stale ones included
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(TierTable::default())
    }
}
