//! Fixed-buffer allocator
//!
//! Bump allocation from a caller-supplied, pre-sized buffer that never
//! grows. Exhaustion is an error, not a growth trigger, which makes this
//! the strategy of choice when the memory ceiling must be explicit.
//!
//! ## Invariants
//!
//! - All issued pointers lie within `[start_addr, end_addr)`
//! - The cursor only moves forward, except for a LIFO pop of the most
//!   recent region (compare-and-swap keeps issued ranges disjoint)
//! - Prior allocations are never moved or overwritten by later requests

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{MemoryError, MemoryResult};
use crate::region::{AllocatorId, Region, validate_layout};
use crate::stats::{AllocatorStats, AtomicAllocatorStats, StatisticsProvider};
use crate::utils::{Backoff, align_up};

#[cfg(feature = "logging")]
use tracing::debug;

use super::AllocStrategy;

/// Thread-safe wrapper for the memory buffer with interior mutability
#[repr(transparent)]
struct SyncUnsafeCell<T: ?Sized>(UnsafeCell<T>);

// SAFETY: all mutable access to the buffer goes through ranges carved
// out by the atomic cursor CAS, so no two threads ever hold overlapping
// mutable views.
unsafe impl<T: ?Sized> Sync for SyncUnsafeCell<T> {}

// SAFETY: repr(transparent) over UnsafeCell<T>; the wrapper adds no
// thread-local state, so it can move between threads when T can.
unsafe impl<T: ?Sized + Send> Send for SyncUnsafeCell<T> {}

impl<T: ?Sized> SyncUnsafeCell<T> {
    fn get(&self) -> *mut T {
        self.0.get()
    }
}

/// Allocator drawing from a fixed, never-growing backing buffer.
pub struct FixedBufferAllocator {
    /// Owned backing buffer with interior mutability
    memory: Box<SyncUnsafeCell<[u8]>>,
    id: AllocatorId,
    start_addr: usize,
    end_addr: usize,
    capacity: usize,
    /// Address of the first free byte
    cursor: AtomicUsize,
    stats: AtomicAllocatorStats,
}

impl FixedBufferAllocator {
    /// Creates an allocator backed by a fresh, zeroed buffer of
    /// `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> MemoryResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::invalid_config("capacity cannot be zero"));
        }
        Ok(Self::from_boxed_slice(vec![0u8; capacity].into_boxed_slice()))
    }

    /// Creates an allocator over a caller-supplied buffer.
    #[must_use]
    pub fn from_boxed_slice(buffer: Box<[u8]>) -> Self {
        let capacity = buffer.len();
        let ptr = Box::into_raw(buffer).cast::<u8>();
        // SAFETY: SyncUnsafeCell is repr(transparent) over UnsafeCell,
        // which is repr(transparent) over T, so SyncUnsafeCell<[u8]> has
        // the same layout as [u8]. Ownership transfers via into_raw/from_raw
        // with the length preserved.
        let memory: Box<SyncUnsafeCell<[u8]>> = unsafe {
            Box::from_raw(
                core::ptr::slice_from_raw_parts_mut(ptr, capacity) as *mut SyncUnsafeCell<[u8]>
            )
        };

        // SAFETY: the buffer was just allocated; get() points at it.
        let start_addr = unsafe { (*memory.get()).as_ptr() as usize };
        let id = AllocatorId::next();

        #[cfg(feature = "logging")]
        debug!(id = id.as_u64(), capacity, "fixed-buffer allocator created");

        Self {
            memory,
            id,
            start_addr,
            end_addr: start_addr + capacity,
            capacity,
            cursor: AtomicUsize::new(start_addr),
            stats: AtomicAllocatorStats::new(),
        }
    }

    /// Total capacity of the backing buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed from the buffer (including alignment padding).
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
            .load(Ordering::Acquire)
            .saturating_sub(self.start_addr)
    }

    /// Bytes still available for allocation.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Rewinds the cursor to the start of the buffer.
    ///
    /// All previously issued regions become invalid.
    pub fn reset(&self) {
        self.cursor.store(self.start_addr, Ordering::Release);
        self.stats.drain_outstanding();
    }

    /// Tears the allocator down, reporting unreleased regions as a leak.
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

    /// CAS loop carving `size` bytes at `align` out of the buffer.
    fn try_allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let mut backoff = Backoff::new();

        loop {
            let current = self.cursor.load(Ordering::Acquire);
            let aligned = align_up(current, align);
            let new_cursor = aligned.checked_add(size)?;

            if new_cursor > self.end_addr {
                return None;
            }

            if self
                .cursor
                .compare_exchange_weak(current, new_cursor, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // CAS success: [aligned, new_cursor) is exclusively ours
                return NonNull::new(aligned as *mut u8);
            }

            backoff.spin_or_yield();
        }
    }
}

impl AllocStrategy for FixedBufferAllocator {
    fn allocate(&self, layout: Layout) -> MemoryResult<Region> {
        validate_layout(layout)?;

        if layout.size() == 0 {
            return Ok(Region::dangling(layout.align(), self.id));
        }

        match self.try_allocate(layout.size(), layout.align()) {
            Some(ptr) => {
                self.stats.record_allocation(layout.size());
                Ok(Region::new(ptr, layout, self.id))
            }
            None => {
                self.stats.record_failure();
                Err(MemoryError::out_of_memory_with_available(
                    layout.size(),
                    self.available(),
                ))
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

        // LIFO fast path: if this is the most recent allocation, hand the
        // bytes back by rewinding the cursor. Otherwise the bytes stay
        // consumed until reset, but the outstanding accounting still drops.
        let top = region.addr() + region.len();
        let _ = self.cursor.compare_exchange(
            top,
            region.addr(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );

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

impl StatisticsProvider for FixedBufferAllocator {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for FixedBufferAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FixedBufferAllocator")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .finish_non_exhaustive()
    }
}
