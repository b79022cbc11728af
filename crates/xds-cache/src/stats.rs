//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for snapshot cache operations.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of snapshot sets.
    snapshots_set: AtomicU64,
    /// Number of snapshot lookups that found a snapshot.
    snapshot_hits: AtomicU64,
    /// Number of snapshot lookups that found nothing.
    snapshot_misses: AtomicU64,
    /// Number of snapshot clears.
    snapshots_cleared: AtomicU64,
    /// Number of watches registered as pending.
    watches_created: AtomicU64,
    /// Number of pending watches removed by their cancel handle.
    watches_cancelled: AtomicU64,
    /// Number of responses delivered to watches.
    responses_delivered: AtomicU64,
}

impl CacheStats {
    /// Create new cache statistics.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_set(&self) {
        self.snapshots_set.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.snapshot_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.snapshot_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_clear(&self) {
        self.snapshots_cleared.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_watch_created(&self) {
        self.watches_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_watch_cancelled(&self) {
        self.watches_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_responses(&self, count: u64) {
        self.responses_delivered.fetch_add(count, Ordering::Relaxed);
    }

    /// Get total snapshots set.
    #[inline]
    pub fn snapshots_set(&self) -> u64 {
        self.snapshots_set.load(Ordering::Relaxed)
    }

    /// Get total snapshot hits.
    #[inline]
    pub fn snapshot_hits(&self) -> u64 {
        self.snapshot_hits.load(Ordering::Relaxed)
    }

    /// Get total snapshot misses.
    #[inline]
    pub fn snapshot_misses(&self) -> u64 {
        self.snapshot_misses.load(Ordering::Relaxed)
    }

    /// Get total snapshots cleared.
    #[inline]
    pub fn snapshots_cleared(&self) -> u64 {
        self.snapshots_cleared.load(Ordering::Relaxed)
    }

    /// Get total watches registered.
    #[inline]
    pub fn watches_created(&self) -> u64 {
        self.watches_created.load(Ordering::Relaxed)
    }

    /// Get total watches cancelled.
    #[inline]
    pub fn watches_cancelled(&self) -> u64 {
        self.watches_cancelled.load(Ordering::Relaxed)
    }

    /// Get total responses delivered to watches.
    #[inline]
    pub fn responses_delivered(&self) -> u64 {
        self.responses_delivered.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.snapshot_hits() as f64;
        let total = hits + self.snapshot_misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.snapshots_set,
            &self.snapshot_hits,
            &self.snapshot_misses,
            &self.snapshots_cleared,
            &self.watches_created,
            &self.watches_cancelled,
            &self.responses_delivered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
