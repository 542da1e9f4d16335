//! General-purpose allocator
//!
//! The safety-focused strategy: every outstanding region is recorded in a
//! ledger keyed by address, so double release, releases of regions this
//! allocator never issued, and layout mismatches are detected and reported
//! as [`MemoryError::InvalidRelease`] *before* any memory is touched.
//! Destroying the allocator with live entries frees them and reports a
//! leak.
//!
//! Thread-safe: the ledger is guarded by a mutex, so concurrent
//! allocate/release calls serialize their bookkeeping and cannot corrupt
//! it.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{MemoryError, MemoryResult};
use crate::region::{AllocatorId, Region, validate_layout};
use crate::stats::{AllocatorStats, AtomicAllocatorStats, StatisticsProvider};

#[cfg(feature = "logging")]
use tracing::debug;

use super::AllocStrategy;

/// What the ledger remembers about one outstanding region
#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    size: usize,
    align: usize,
}

/// Allocator that tracks every outstanding allocation.
///
/// Slower than [`super::PassthroughAllocator`] (one guarded map operation
/// per call), in exchange for misuse detection that the faster strategies
/// cannot offer.
pub struct GeneralPurposeAllocator {
    id: AllocatorId,
    ledger: Mutex<HashMap<usize, LedgerEntry>>,
    stats: AtomicAllocatorStats,
}

impl GeneralPurposeAllocator {
    /// Creates a new general-purpose allocator.
    #[must_use]
    pub fn new() -> Self {
        let id = AllocatorId::next();

        #[cfg(feature = "logging")]
        debug!(id = id.as_u64(), "general-purpose allocator created");

        Self {
            id,
            ledger: Mutex::new(HashMap::new()),
            stats: AtomicAllocatorStats::new(),
        }
    }

    /// Number of regions currently outstanding.
    pub fn outstanding_regions(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Whether any region is still outstanding.
    pub fn has_leaks(&self) -> bool {
        self.outstanding_regions() > 0
    }

    /// Tears the allocator down.
    ///
    /// Outstanding regions are freed so the memory is not lost, but their
    /// existence is a caller bug and is reported as
    /// [`MemoryError::LeakDetected`].
    pub fn destroy(self) -> MemoryResult<()> {
        let (regions, bytes) = self.free_outstanding();
        if regions > 0 {
            return Err(MemoryError::leak_detected(regions, bytes));
        }
        Ok(())
    }

    /// Frees every ledgered region, returning how many there were.
    fn free_outstanding(&self) -> (usize, usize) {
        let entries: Vec<(usize, LedgerEntry)> = self.ledger.lock().drain().collect();
        let regions = entries.len();
        let mut bytes = 0;

        for (addr, entry) in entries {
            bytes += entry.size;
            // SAFETY: the entry was inserted by allocate with exactly this
            // address and layout, and removal from the ledger above
            // guarantees it is freed only once.
            unsafe {
                dealloc(
                    addr as *mut u8,
                    Layout::from_size_align_unchecked(entry.size, entry.align),
                );
            }
        }

        (regions, bytes)
    }
}

impl Default for GeneralPurposeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GeneralPurposeAllocator {
    fn drop(&mut self) {
        // destroy() drains the ledger first, so this only fires for
        // allocators dropped without an explicit teardown
        let (regions, bytes) = self.free_outstanding();
        if regions > 0 {
            #[cfg(feature = "logging")]
            tracing::warn!(regions, bytes, "allocator dropped with outstanding regions");
            #[cfg(not(feature = "logging"))]
            let _ = (regions, bytes);
        }
    }
}

impl AllocStrategy for GeneralPurposeAllocator {
    fn allocate(&self, layout: Layout) -> MemoryResult<Region> {
        validate_layout(layout)?;

        if layout.size() == 0 {
            return Ok(Region::dangling(layout.align(), self.id));
        }

        // SAFETY: layout validated above, size is non-zero.
        let ptr = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            self.stats.record_failure();
            return Err(MemoryError::out_of_memory(layout.size()));
        };

        let previous = self.ledger.lock().insert(
            ptr.as_ptr() as usize,
            LedgerEntry {
                size: layout.size(),
                align: layout.align(),
            },
        );
        // The global allocator cannot hand out an address that is still
        // ledgered as live
        debug_assert!(previous.is_none());

        self.stats.record_allocation(layout.size());
        Ok(Region::new(ptr, layout, self.id))
    }

    unsafe fn release(&self, region: Region) -> MemoryResult<()> {
        if region.owner() != self.id {
            return Err(MemoryError::invalid_release(
                region.addr(),
                "region was issued by a different allocator",
            ));
        }

        if region.is_empty() {
            return Ok(());
        }

        let mut ledger = self.ledger.lock();
        let Some(entry) = ledger.get(&region.addr()).copied() else {
            return Err(MemoryError::invalid_release(
                region.addr(),
                "double release, or region was never issued",
            ));
        };

        if entry.size != region.len() || entry.align != region.align() {
            return Err(MemoryError::invalid_release(
                region.addr(),
                "layout does not match the issued region",
            ));
        }

        ledger.remove(&region.addr());
        drop(ledger);

        // SAFETY: the ledger proved this address is a live allocation made
        // by this allocator with exactly this layout, and removing the
        // entry above means no later release can reach this point again.
        unsafe {
            dealloc(region.as_ptr(), region.layout());
        }

        self.stats.record_release(region.len());
        Ok(())
    }

    fn allocation_count(&self) -> usize {
        self.stats.allocation_count()
    }

    fn outstanding_bytes(&self) -> usize {
        self.stats.outstanding_bytes()
    }
}

impl StatisticsProvider for GeneralPurposeAllocator {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for GeneralPurposeAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeneralPurposeAllocator")
            .field("id", &self.id)
            .field("outstanding_regions", &self.outstanding_regions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_round_trip() {
        let allocator = GeneralPurposeAllocator::new();
        let region = allocator.allocate_bytes(128, 16).unwrap();

        assert_eq!(allocator.outstanding_regions(), 1);
        assert_eq!(allocator.outstanding_bytes(), 128);

        unsafe { allocator.release(region).unwrap() };
        assert_eq!(allocator.outstanding_regions(), 0);
        assert!(!allocator.has_leaks());
    }

    #[test]
    fn double_release_is_detected() {
        let allocator = GeneralPurposeAllocator::new();
        let region = allocator.allocate_bytes(64, 8).unwrap();

        unsafe {
            allocator.release(region).unwrap();
            let err = allocator.release(region).unwrap_err();
            assert!(matches!(err, MemoryError::InvalidRelease { .. }));
        }
    }

    #[test]
    fn foreign_region_is_detected() {
        let gpa = GeneralPurposeAllocator::new();
        let other = GeneralPurposeAllocator::new();
        let region = other.allocate_bytes(64, 8).unwrap();

        let err = unsafe { gpa.release(region).unwrap_err() };
        assert!(matches!(err, MemoryError::InvalidRelease { .. }));

        unsafe { other.release(region).unwrap() };
    }

    #[test]
    fn destroy_with_outstanding_reports_leak() {
        let allocator = GeneralPurposeAllocator::new();
        let _a = allocator.allocate_bytes(32, 8).unwrap();
        let _b = allocator.allocate_bytes(32, 8).unwrap();

        let err = allocator.destroy().unwrap_err();
        assert!(matches!(
            err,
            MemoryError::LeakDetected {
                regions: 2,
                bytes: 64
            }
        ));
    }

    #[test]
    fn destroy_clean_after_releases() {
        let allocator = GeneralPurposeAllocator::new();
        let region = allocator.allocate_bytes(32, 8).unwrap();
        unsafe { allocator.release(region).unwrap() };
        allocator.destroy().unwrap();
    }

    #[test]
    fn concurrent_bookkeeping_stays_consistent() {
        use std::sync::Arc;

        let allocator = Arc::new(GeneralPurposeAllocator::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let allocator = Arc::clone(&allocator);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let region = allocator.allocate_bytes(24, 8).unwrap();
                    unsafe { allocator.release(region).unwrap() };
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(allocator.outstanding_regions(), 0);
        assert_eq!(allocator.outstanding_bytes(), 0);
        assert_eq!(allocator.allocation_count(), 800);
    }
}
