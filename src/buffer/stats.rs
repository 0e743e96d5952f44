//! Buffer manager statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by the buffer manager.
///
/// All fields are atomic and updated with `Ordering::Relaxed`: each counter
/// only needs atomicity, not ordering relative to the others.
///
/// # Example
/// ```
/// use vectorpool::BufferStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = BufferStats::new();
/// stats.cache_hits.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().cache_hits, 1);
/// ```
#[derive(Debug, Default)]
pub struct BufferStats {
    /// Pins that found the object already resident.
    pub cache_hits: AtomicU64,

    /// Pins that had to drive a Loading transition.
    pub cache_misses: AtomicU64,

    /// Successful Loading transitions.
    pub loads: AtomicU64,

    /// Objects moved from Resident back to Unloaded by eviction.
    pub evictions: AtomicU64,

    /// Successful write-backs (explicit or during eviction).
    pub flushes: AtomicU64,

    /// Write-backs that failed and left the object resident and dirty.
    pub flush_failures: AtomicU64,

    /// Pins rejected by budget admission.
    pub admission_failures: AtomicU64,
}

impl BufferStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    /// Get a non-atomic copy for display/logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            admission_failures: self.admission_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.cache_hits,
            &self.cache_misses,
            &self.loads,
            &self.evictions,
            &self.flushes,
            &self.flush_failures,
            &self.admission_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of buffer manager statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub loads: u64,
    pub evictions: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub admission_failures: u64,
}

impl StatsSnapshot {
    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, evictions: {}, flushes: {}, hit_rate: {:.2}% }}",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.flushes,
            self.hit_rate() * 100.0
        )
    }
}
