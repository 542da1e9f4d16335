//! Arena allocator
//!
//! Bump allocation from a chain of chunks that grows geometrically.
//! Individual release is a recorded no-op; [`ArenaAllocator::reset`] and
//! [`ArenaAllocator::destroy`] reclaim every region in one operation,
//! regardless of how many were issued.
//!
//! ## Invariants
//!
//! - Allocations never overlap (the bump offset only moves forward
//!   within a chunk, and the chunk chain is mutated under a mutex)
//! - A region stays valid until the arena is reset or destroyed
//! - `OutOfMemory` is only returned when the backing cannot grow:
//!   the chunk allocation itself fails, or a single request cannot fit
//!   inside `max_chunk_size`

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc};

use parking_lot::Mutex;

use crate::error::{MemoryError, MemoryResult};
use crate::region::{AllocatorId, Region, validate_layout};
use crate::stats::{AllocatorStats, AtomicAllocatorStats, StatisticsProvider};
use crate::utils::align_up;

#[cfg(feature = "logging")]
use tracing::debug;

use super::AllocStrategy;

/// Arena configuration
#[derive(Debug, Clone, Copy)]
pub struct ArenaConfig {
    /// Size of the first chunk
    pub initial_size: usize,
    /// Multiplier applied to the previous chunk size when growing
    pub growth_factor: f64,
    /// Upper bound for a single chunk; requests that cannot fit fail
    pub max_chunk_size: usize,
    /// Wipe chunk memory before reclaiming it on reset
    pub zero_on_reset: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_size: 4 * 1024,
            growth_factor: 2.0,
            max_chunk_size: 16 * 1024 * 1024,
            zero_on_reset: false,
        }
    }
}

impl ArenaConfig {
    /// Production preset: larger first chunk, no wiping.
    #[must_use]
    pub fn production() -> Self {
        Self {
            initial_size: 64 * 1024,
            ..Self::default()
        }
    }

    /// Debug preset: small chunks, memory wiped on reset.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            initial_size: 4 * 1024,
            zero_on_reset: true,
            ..Self::default()
        }
    }

    /// Sets the initial chunk size.
    #[must_use]
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Sets the maximum chunk size.
    #[must_use]
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    fn validate(&self) -> MemoryResult<()> {
        if self.initial_size == 0 {
            return Err(MemoryError::invalid_config("initial_size cannot be zero"));
        }
        if self.growth_factor < 1.0 {
            return Err(MemoryError::invalid_config(
                "growth_factor must be at least 1.0",
            ));
        }
        if self.max_chunk_size < self.initial_size {
            return Err(MemoryError::invalid_config(
                "max_chunk_size smaller than initial_size",
            ));
        }
        Ok(())
    }
}

/// Memory chunk in the arena chain
struct Chunk {
    ptr: NonNull<u8>,
    capacity: usize,
    used: usize,
    next: Option<Box<Chunk>>,
}

impl Chunk {
    /// Allocates a chunk of at least 64 bytes.
    fn new(size: usize) -> MemoryResult<Box<Self>> {
        let size = size.max(64);
        let layout = Layout::from_size_align(size, 1)
            .map_err(|_| MemoryError::invalid_layout("chunk layout"))?;

        // SAFETY: layout has non-zero size and alignment 1.
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| MemoryError::out_of_memory(size))?;

        Ok(Box::new(Self {
            ptr,
            capacity: size,
            used: 0,
            next: None,
        }))
    }

    #[inline]
    fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Bumps the offset for `size` bytes at `align`, if they fit.
    fn try_alloc(&mut self, size: usize, align: usize) -> Option<*mut u8> {
        let aligned = align_up(self.base() + self.used, align);
        let new_used = (aligned - self.base()).checked_add(size)?;
        if new_used > self.capacity {
            return None;
        }
        self.used = new_used;
        Some(aligned as *mut u8)
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in Chunk::new with this capacity and
        // alignment 1; Drop runs exactly once.
        unsafe {
            dealloc(
                self.ptr.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, 1),
            );
        }
    }
}

// SAFETY: a chunk exclusively owns its allocation; nothing in it is
// tied to the creating thread.
unsafe impl Send for Chunk {}

/// Chain state, mutated only under the arena's mutex
struct ArenaState {
    head: Option<Box<Chunk>>,
    total_capacity: usize,
}

impl ArenaState {
    fn clear(&mut self, zero: bool) {
        // Iterative teardown; recursive Box drops would otherwise nest
        // once per chunk
        let mut current = self.head.take();
        while let Some(mut chunk) = current {
            if zero {
                // SAFETY: the chunk's allocation is live and exclusively
                // owned here (chain detached under the mutex).
                unsafe {
                    core::ptr::write_bytes(chunk.ptr.as_ptr(), 0, chunk.capacity);
                }
            }
            current = chunk.next.take();
        }
        self.total_capacity = 0;
    }
}

impl Drop for ArenaState {
    fn drop(&mut self) {
        self.clear(false);
    }
}

/// Arena allocation strategy.
///
/// Thread-safe: the chunk chain is guarded by a mutex, so concurrent
/// allocations serialize rather than corrupt the chain.
pub struct ArenaAllocator {
    id: AllocatorId,
    config: ArenaConfig,
    state: Mutex<ArenaState>,
    stats: AtomicAllocatorStats,
}

impl ArenaAllocator {
    /// Creates an arena with the given configuration.
    pub fn with_config(config: ArenaConfig) -> MemoryResult<Self> {
        config.validate()?;

        let id = AllocatorId::next();

        #[cfg(feature = "logging")]
        debug!(
            id = id.as_u64(),
            initial_size = config.initial_size,
            growth_factor = config.growth_factor,
            "arena allocator created"
        );

        Ok(Self {
            id,
            config,
            state: Mutex::new(ArenaState {
                head: None,
                total_capacity: 0,
            }),
            stats: AtomicAllocatorStats::new(),
        })
    }

    /// Creates an arena whose first chunk holds at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(ArenaConfig::default().with_initial_size(capacity))
    }

    /// Total capacity of all chunks currently held.
    pub fn capacity(&self) -> usize {
        self.state.lock().total_capacity
    }

    /// Reclaims every region issued so far in one operation.
    ///
    /// All previously issued regions become invalid. The arena itself
    /// stays usable and will grow a fresh chunk on the next allocation.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.clear(self.config.zero_on_reset);
        self.stats.drain_outstanding();

        #[cfg(feature = "logging")]
        debug!(id = self.id.as_u64(), "arena reset");
    }

    /// Tears the arena down, reclaiming all outstanding regions at once.
    ///
    /// Unlike the tracking strategies this never reports a leak: bulk
    /// reclamation on teardown is the arena contract.
    pub fn destroy(self) -> MemoryResult<()> {
        self.reset();
        Ok(())
    }

    /// Picks the size for the next chunk.
    fn next_chunk_size(&self, previous: Option<usize>, needed: usize) -> usize {
        let grown = match previous {
            Some(last) => (last as f64 * self.config.growth_factor) as usize,
            None => self.config.initial_size,
        };
        grown.max(needed).min(self.config.max_chunk_size)
    }
}

impl AllocStrategy for ArenaAllocator {
    fn allocate(&self, layout: Layout) -> MemoryResult<Region> {
        validate_layout(layout)?;

        if layout.size() == 0 {
            return Ok(Region::dangling(layout.align(), self.id));
        }

        // Worst case the chunk base is misaligned by align-1 bytes
        let needed = layout.size() + (layout.align() - 1);
        if needed > self.config.max_chunk_size {
            self.stats.record_failure();
            return Err(MemoryError::out_of_memory(layout.size()));
        }

        let mut state = self.state.lock();

        if let Some(head) = state.head.as_mut() {
            if let Some(ptr) = head.try_alloc(layout.size(), layout.align()) {
                self.stats.record_allocation(layout.size());
                // SAFETY: try_alloc returns a pointer inside the live chunk
                let ptr = unsafe { NonNull::new_unchecked(ptr) };
                return Ok(Region::new(ptr, layout, self.id));
            }
        }

        // Current chunk exhausted (or none yet): grow the chain
        let chunk_size =
            self.next_chunk_size(state.head.as_ref().map(|c| c.capacity), needed);
        let mut chunk = match Chunk::new(chunk_size) {
            Ok(chunk) => chunk,
            Err(err) => {
                self.stats.record_failure();
                return Err(err);
            }
        };

        let ptr = chunk
            .try_alloc(layout.size(), layout.align())
            .ok_or_else(|| MemoryError::out_of_memory(layout.size()))?;

        chunk.next = state.head.take();
        state.total_capacity += chunk.capacity;
        state.head = Some(chunk);

        self.stats.record_allocation(layout.size());
        // SAFETY: the fresh chunk was sized to fit this allocation
        let ptr = unsafe { NonNull::new_unchecked(ptr) };
        Ok(Region::new(ptr, layout, self.id))
    }

    unsafe fn release(&self, region: Region) -> MemoryResult<()> {
        if region.owner() != self.id {
            return Err(MemoryError::invalid_release(
                region.addr(),
                "region was issued by a different allocator",
            ));
        }

        // Per-region release is a recorded no-op; the memory comes back
        // on reset or destroy
        if !region.is_empty() {
            self.stats.record_release(region.len());
        }
        Ok(())
    }

    fn allocation_count(&self) -> usize {
        self.stats.allocation_count()
    }

    fn outstanding_bytes(&self) -> usize {
        self.stats.outstanding_bytes()
    }
}

impl StatisticsProvider for ArenaAllocator {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocations_do_not_overlap() {
        let arena = ArenaAllocator::with_capacity(1024).unwrap();

        let a = arena.allocate_bytes(100, 8).unwrap();
        let b = arena.allocate_bytes(100, 8).unwrap();

        let a_range = a.addr()..a.addr() + a.len();
        assert!(!a_range.contains(&b.addr()));
        assert_eq!(b.addr() % 8, 0);
    }

    #[test]
    fn grows_when_chunk_is_exhausted() {
        let arena =
            ArenaAllocator::with_config(ArenaConfig::default().with_initial_size(128)).unwrap();

        for _ in 0..10 {
            arena.allocate_bytes(100, 1).unwrap();
        }
        assert!(arena.capacity() > 128);
        assert_eq!(arena.allocation_count(), 10);
    }

    #[test]
    fn release_is_a_recorded_noop() {
        let arena = ArenaAllocator::with_capacity(1024).unwrap();
        let region = arena.allocate_bytes(64, 8).unwrap();

        assert_eq!(arena.outstanding_bytes(), 64);
        unsafe { arena.release(region).unwrap() };
        assert_eq!(arena.outstanding_bytes(), 0);

        // The bytes are not reused until reset: next allocation bumps on
        let next = arena.allocate_bytes(64, 8).unwrap();
        assert_ne!(next.addr(), region.addr());
    }

    #[test]
    fn reset_reclaims_everything_and_stays_usable() {
        let arena = ArenaAllocator::with_capacity(256).unwrap();
        for _ in 0..20 {
            arena.allocate_bytes(64, 8).unwrap();
        }

        arena.reset();
        assert_eq!(arena.outstanding_bytes(), 0);
        assert_eq!(arena.capacity(), 0);

        let region = arena.allocate_bytes(32, 8).unwrap();
        assert_eq!(region.len(), 32);
    }

    #[test]
    fn destroy_reclaims_n_regions_in_one_operation() {
        let arena = ArenaAllocator::with_capacity(4096).unwrap();
        for _ in 0..1000 {
            arena.allocate_bytes(16, 8).unwrap();
        }
        arena.destroy().unwrap();
    }

    #[test]
    fn oversized_request_cannot_grow() {
        let arena = ArenaAllocator::with_config(
            ArenaConfig::default()
                .with_initial_size(64)
                .with_max_chunk_size(1024),
        )
        .unwrap();

        let err = arena.allocate_bytes(2048, 8).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { .. }));
    }

    #[test]
    fn config_validation() {
        assert!(ArenaAllocator::with_config(ArenaConfig::default().with_initial_size(0)).is_err());
        assert!(
            ArenaAllocator::with_config(ArenaConfig::default().with_growth_factor(0.5)).is_err()
        );
    }

    #[test]
    fn foreign_region_is_rejected() {
        let arena = ArenaAllocator::with_capacity(256).unwrap();
        let other = ArenaAllocator::with_capacity(256).unwrap();
        let region = other.allocate_bytes(16, 8).unwrap();

        let err = unsafe { arena.release(region).unwrap_err() };
        assert!(matches!(err, MemoryError::InvalidRelease { .. }));
    }
}
