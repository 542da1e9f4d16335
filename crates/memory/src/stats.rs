//! Allocator statistics tracking
//!
//! Every strategy maintains an [`AtomicAllocatorStats`] so callers can ask
//! for allocation counts and outstanding bytes without taking any lock.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time statistics snapshot for one allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Total number of successful allocations
    pub allocation_count: usize,
    /// Total number of releases
    pub release_count: usize,
    /// Number of failed allocations
    pub failed_allocations: usize,
    /// Bytes currently outstanding (allocated and not yet released)
    pub outstanding_bytes: usize,
    /// Peak outstanding bytes
    pub peak_bytes: usize,
    /// Total bytes ever allocated (cumulative)
    pub total_bytes_allocated: usize,
}

impl AllocatorStats {
    /// Creates a new empty stats object
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            release_count: 0,
            failed_allocations: 0,
            outstanding_bytes: 0,
            peak_bytes: 0,
            total_bytes_allocated: 0,
        }
    }

    /// Number of regions allocated but not yet released
    #[must_use]
    pub fn outstanding_regions(&self) -> usize {
        self.allocation_count.saturating_sub(self.release_count)
    }

    /// Whether any regions are still outstanding
    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        self.outstanding_regions() > 0
    }
}

impl core::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Allocator statistics:")?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        writeln!(f, "  Releases: {}", self.release_count)?;
        writeln!(f, "  Failed allocations: {}", self.failed_allocations)?;
        writeln!(f, "  Outstanding: {} bytes", self.outstanding_bytes)?;
        writeln!(f, "  Peak: {} bytes", self.peak_bytes)?;
        writeln!(f, "  Total allocated: {} bytes", self.total_bytes_allocated)
    }
}

/// Thread-safe statistics maintained by the strategies
#[derive(Debug, Default)]
pub struct AtomicAllocatorStats {
    allocation_count: AtomicUsize,
    release_count: AtomicUsize,
    failed_allocations: AtomicUsize,
    outstanding_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    total_bytes_allocated: AtomicUsize,
}

impl AtomicAllocatorStats {
    /// Creates a new empty atomic stats object
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocation_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
            failed_allocations: AtomicUsize::new(0),
            outstanding_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            total_bytes_allocated: AtomicUsize::new(0),
        }
    }

    /// Record a successful allocation of `size` bytes
    pub fn record_allocation(&self, size: usize) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_allocated.fetch_add(size, Ordering::Relaxed);

        // Overflow-safe outstanding update; saturate rather than wrap
        let mut current = self.outstanding_bytes.load(Ordering::Relaxed);
        let new_outstanding = loop {
            let next = current.checked_add(size).unwrap_or(usize::MAX);
            match self.outstanding_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };

        // Peak only moves up
        let mut peak = self.peak_bytes.load(Ordering::Relaxed);
        while new_outstanding > peak {
            match self.peak_bytes.compare_exchange_weak(
                peak,
                new_outstanding,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
    }

    /// Record a release of `size` bytes
    pub fn record_release(&self, size: usize) {
        self.release_count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.outstanding_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(size);
            match self.outstanding_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record a failed allocation
    pub fn record_failure(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero the outstanding byte count, returning the previous value.
    ///
    /// Used by bulk-reclaim operations (arena reset, allocator destroy).
    pub fn drain_outstanding(&self) -> usize {
        self.outstanding_bytes.swap(0, Ordering::Relaxed)
    }

    /// Current outstanding bytes
    #[must_use]
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.load(Ordering::Relaxed)
    }

    /// Total successful allocations
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }

    /// Total releases
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::Relaxed)
    }

    /// Regions allocated but not yet released
    #[must_use]
    pub fn outstanding_regions(&self) -> usize {
        self.allocation_count()
            .saturating_sub(self.release_count())
    }

    /// Get a snapshot of the current statistics
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            release_count: self.release_count.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            outstanding_bytes: self.outstanding_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            total_bytes_allocated: self.total_bytes_allocated.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&self) {
        self.allocation_count.store(0, Ordering::Relaxed);
        self.release_count.store(0, Ordering::Relaxed);
        self.failed_allocations.store(0, Ordering::Relaxed);
        self.outstanding_bytes.store(0, Ordering::Relaxed);
        self.peak_bytes.store(0, Ordering::Relaxed);
        self.total_bytes_allocated.store(0, Ordering::Relaxed);
    }
}

/// Trait for allocators that expose statistics
pub trait StatisticsProvider {
    /// Get current statistics
    fn statistics(&self) -> AllocatorStats;

    /// Reset statistics
    fn reset_statistics(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_snapshots() {
        let stats = AtomicAllocatorStats::new();

        stats.record_allocation(100);
        stats.record_allocation(50);
        assert_eq!(stats.outstanding_bytes(), 150);

        stats.record_release(30);
        let snap = stats.snapshot();
        assert_eq!(snap.allocation_count, 2);
        assert_eq!(snap.release_count, 1);
        assert_eq!(snap.outstanding_bytes, 120);
        assert_eq!(snap.peak_bytes, 150);
        assert_eq!(snap.total_bytes_allocated, 150);
        assert_eq!(snap.outstanding_regions(), 1);
    }

    #[test]
    fn peak_survives_release() {
        let stats = AtomicAllocatorStats::new();
        stats.record_allocation(200);
        stats.record_release(200);
        stats.record_allocation(10);
        assert_eq!(stats.snapshot().peak_bytes, 200);
    }

    #[test]
    fn release_saturates_at_zero() {
        let stats = AtomicAllocatorStats::new();
        stats.record_allocation(10);
        stats.record_release(50);
        assert_eq!(stats.outstanding_bytes(), 0);
    }

    #[test]
    fn drain_returns_previous_outstanding() {
        let stats = AtomicAllocatorStats::new();
        stats.record_allocation(64);
        assert_eq!(stats.drain_outstanding(), 64);
        assert_eq!(stats.outstanding_bytes(), 0);
    }
}
