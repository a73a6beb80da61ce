//! Parsed-file cache
//!
//! Entries are keyed by file path and the modification time observed when the
//! file was parsed. A lookup with a different modification time, or one made
//! after the entry's time-to-live has passed, evicts the entry and misses. No
//! explicit invalidation is needed: any write to a log file changes its key.
//!
//! The cache is owned by a [`crate::parser::LogReader`] instance and backed by a
//! [`DashMap`], so project directories can be read concurrently. Time is read
//! through a [`Clock`] so tests can advance it by hand.

use crate::models::UsageRecord;
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::trace;

pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Monotonic time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    modified: SystemTime,
    records: Arc<Vec<UsageRecord>>,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ParseCache {
    entries: DashMap<PathBuf, CacheEntry>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TIMEOUT)
    }
}

impl std::fmt::Debug for ParseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseCache")
            .field("timeout", &self.timeout)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ParseCache {
    pub fn new(timeout: Duration) -> Self {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            timeout,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Look up `path` as of modification time `modified`. Stale entries are evicted.
    pub fn get(&self, path: &Path, modified: SystemTime) -> Option<Arc<Vec<UsageRecord>>> {
        let now = self.clock.now();
        let fresh = self.entries.get(path).and_then(|entry| {
            let expired = now.saturating_duration_since(entry.inserted_at) > self.timeout;
            if entry.modified == modified && !expired {
                Some(Arc::clone(&entry.records))
            } else {
                None
            }
        });

        match fresh {
            Some(records) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = %path.display(), "Cache hit");
                Some(records)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.invalidate(path);
                None
            }
        }
    }

    pub fn insert(&self, path: PathBuf, modified: SystemTime, records: Arc<Vec<UsageRecord>>) {
        let entry = CacheEntry {
            modified,
            records,
            inserted_at: self.clock.now(),
        };
        self.entries.insert(path, entry);
    }

    /// Drop the entry for `path`, if any.
    pub fn invalidate(&self, path: &Path) {
        if self.entries.remove(path).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(path = %path.display(), "Cache entry evicted");
        }
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
