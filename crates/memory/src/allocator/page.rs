//! Page-mapping allocator
//!
//! Every allocation is a direct system-level memory request: `mmap` on
//! unix, `VirtualAlloc` on windows (see [`crate::sys`]). There is no
//! pooling and no reuse — release returns the pages to the system
//! immediately. Sizes are rounded up to the page size, so this strategy
//! only pays off for large or long-lived regions.

use core::alloc::Layout;

use crate::error::{MemoryError, MemoryResult};
use crate::region::{AllocatorId, Region, validate_layout};
use crate::stats::{AllocatorStats, AtomicAllocatorStats, StatisticsProvider};
use crate::sys;
use crate::utils::align_up;

#[cfg(feature = "logging")]
use tracing::debug;

use super::AllocStrategy;

/// Allocator where each call maps directly to a system memory request.
///
/// Outstanding mappings are counted (not recorded individually), which is
/// enough for [`PageAllocator::destroy`] to report leaks but not to free
/// them — an unreleased mapping stays with the process.
#[derive(Debug)]
pub struct PageAllocator {
    id: AllocatorId,
    stats: AtomicAllocatorStats,
}

impl PageAllocator {
    /// Creates a new page allocator.
    #[must_use]
    pub fn new() -> Self {
        let id = AllocatorId::next();

        #[cfg(feature = "logging")]
        debug!(id = id.as_u64(), page_size = sys::page_size(), "page allocator created");

        Self {
            id,
            stats: AtomicAllocatorStats::new(),
        }
    }

    /// Bytes a request for `size` actually maps, after page rounding.
    #[must_use]
    pub fn mapped_size(size: usize) -> usize {
        align_up(size.max(1), sys::page_size())
    }

    /// Tears the allocator down, reporting still-mapped regions as a leak.
    pub fn destroy(self) -> MemoryResult<()> {
        let outstanding = self.stats.outstanding_regions();
        if outstanding > 0 {
            return Err(MemoryError::leak_detected(
                outstanding,
                self.stats.outstanding_bytes(),
            ));
        }
        Ok(())
    }
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocStrategy for PageAllocator {
    fn allocate(&self, layout: Layout) -> MemoryResult<Region> {
        validate_layout(layout)?;

        if layout.size() == 0 {
            return Ok(Region::dangling(layout.align(), self.id));
        }

        // Mappings are page-aligned; stricter alignment cannot be honored
        if layout.align() > sys::page_size() {
            self.stats.record_failure();
            return Err(MemoryError::invalid_alignment(layout.align()));
        }

        let mapped = Self::mapped_size(layout.size());
        match sys::map_pages(mapped) {
            Ok(ptr) => {
                self.stats.record_allocation(mapped);
                Ok(Region::new(ptr, layout, self.id))
            }
            Err(_) => {
                self.stats.record_failure();
                Err(MemoryError::out_of_memory(mapped))
            }
        }
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

        let mapped = Self::mapped_size(region.len());
        // SAFETY: region came from allocate on this allocator (caller
        // contract), which mapped exactly `mapped` bytes at this address,
        // and has not been released before (caller contract).
        let unmapped = unsafe {
            sys::unmap_pages(
                core::ptr::NonNull::new(region.as_ptr()).ok_or_else(|| {
                    MemoryError::invalid_release(region.addr(), "null region pointer")
                })?,
                mapped,
            )
        };

        match unmapped {
            Ok(()) => {
                self.stats.record_release(mapped);
                Ok(())
            }
            Err(_) => Err(MemoryError::invalid_release(
                region.addr(),
                "system refused to unmap the region",
            )),
        }
    }

    fn allocation_count(&self) -> usize {
        self.stats.allocation_count()
    }

    fn outstanding_bytes(&self) -> usize {
        self.stats.outstanding_bytes()
    }
}

impl StatisticsProvider for PageAllocator {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_whole_pages() {
        let allocator = PageAllocator::new();
        let region = allocator.allocate_bytes(1, 1).unwrap();

        assert_eq!(region.len(), 1);
        assert_eq!(region.addr() % sys::page_size(), 0);
        assert_eq!(allocator.outstanding_bytes(), sys::page_size());

        unsafe { allocator.release(region).unwrap() };
        assert_eq!(allocator.outstanding_bytes(), 0);
    }

    #[test]
    fn memory_is_writable_across_the_request() {
        let allocator = PageAllocator::new();
        let region = allocator.allocate_bytes(100, 8).unwrap();

        unsafe {
            for i in 0..100 {
                region.as_ptr().add(i).write(i as u8);
            }
            assert_eq!(*region.as_ptr().add(99), 99);
            allocator.release(region).unwrap();
        }
    }

    #[test]
    fn rejects_alignment_beyond_page_size() {
        let allocator = PageAllocator::new();
        let align = sys::page_size() * 2;
        let err = allocator.allocate_bytes(64, align).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidAlignment { .. }));
    }

    #[test]
    fn zero_sized_allocation_is_free() {
        let allocator = PageAllocator::new();
        let region = allocator.allocate(Layout::new::<()>()).unwrap();
        assert!(region.is_empty());
        assert_eq!(allocator.outstanding_bytes(), 0);
        unsafe { allocator.release(region).unwrap() };
    }

    #[test]
    fn destroy_reports_leaks() {
        let allocator = PageAllocator::new();
        let _region = allocator.allocate_bytes(16, 8).unwrap();

        let err = allocator.destroy().unwrap_err();
        assert!(matches!(err, MemoryError::LeakDetected { regions: 1, .. }));
    }

    #[test]
    fn destroy_clean_after_release() {
        let allocator = PageAllocator::new();
        let region = allocator.allocate_bytes(16, 8).unwrap();
        unsafe { allocator.release(region).unwrap() };
        allocator.destroy().unwrap();
    }
}
