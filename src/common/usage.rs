//! Resource-usage counters for in-memory payloads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live payload accounting, shared by the persistence workers that allocate
/// and free payloads.
///
/// An instance is handed to each worker at construction (usually as an
/// `Arc<ResourceUsage>`), so tests can verify that every allocation was
/// paired with a free once the buffer manager is torn down.
///
/// # Example
/// ```
/// use vectorpool::common::ResourceUsage;
///
/// let usage = ResourceUsage::new();
/// usage.record_alloc(4096);
/// assert_eq!(usage.live_payloads(), 1);
/// usage.record_free(4096);
/// assert!(usage.is_balanced());
/// ```
#[derive(Debug, Default)]
pub struct ResourceUsage {
    live_payloads: AtomicU64,
    live_bytes: AtomicU64,
    total_allocations: AtomicU64,
}

impl ResourceUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload allocation charged at `bytes`.
    pub fn record_alloc(&self, bytes: usize) {
        self.live_payloads.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a payload charged at `bytes` was released.
    pub fn record_free(&self, bytes: usize) {
        let old = self.live_payloads.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(old > 0, "payload count underflow");
        self.live_bytes.fetch_sub(bytes as u64, Ordering::Relaxed);
    }

    pub fn live_payloads(&self) -> u64 {
        self.live_payloads.load(Ordering::Relaxed)
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Number of allocations ever recorded.
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }

    /// True when every allocation has been freed.
    pub fn is_balanced(&self) -> bool {
        self.live_payloads() == 0 && self.live_bytes() == 0
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            live_payloads: self.live_payloads(),
            live_bytes: self.live_bytes(),
            total_allocations: self.total_allocations(),
        }
    }
}

/// A point-in-time copy of [`ResourceUsage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub live_payloads: u64,
    pub live_bytes: u64,
    pub total_allocations: u64,
}

impl fmt::Display for UsageSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Usage {{ live: {} payloads / {} bytes, allocations: {} }}",
            self.live_payloads, self.live_bytes, self.total_allocations
        )
    }
}
