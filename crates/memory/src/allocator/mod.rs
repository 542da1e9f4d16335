//! Memory allocation strategies behind one capability interface.
//!
//! Five strategies with very different lifetime/safety/performance
//! tradeoffs implement [`AllocStrategy`]. The strategy is chosen as a
//! value at construction time via the [`Allocator`] enum, not through a
//! trait-object hierarchy, so allocator choice is data and tests can
//! substitute one strategy for another.

mod arena;
mod fixed;
mod general;
mod page;
mod passthrough;

pub use arena::{ArenaAllocator, ArenaConfig};
pub use fixed::FixedBufferAllocator;
pub use general::GeneralPurposeAllocator;
pub use page::PageAllocator;
pub use passthrough::PassthroughAllocator;

use core::alloc::Layout;

use crate::error::{MemoryError, MemoryResult};
use crate::region::Region;
use crate::stats::{AllocatorStats, StatisticsProvider};

/// Uniform allocation contract implemented by every strategy.
///
/// # Safety of `release`
///
/// `release` is unsafe because most strategies trust the caller that the
/// region was issued by this allocator and is still live; violating that
/// is undefined behavior for the page, fixed-buffer and passthrough
/// strategies. The general-purpose strategy validates the region against
/// its ledger before touching memory and reports [`MemoryError::InvalidRelease`]
/// instead, which is the reason to pick it when misuse must be observable.
pub trait AllocStrategy {
    /// Allocates a region for `layout`.
    ///
    /// The returned region's memory is uninitialized. Zero-sized layouts
    /// succeed and yield an empty region with a dangling, aligned pointer.
    fn allocate(&self, layout: Layout) -> MemoryResult<Region>;

    /// Releases a region previously issued by this allocator.
    ///
    /// # Safety
    ///
    /// - `region` must have been returned by `allocate` on this allocator
    /// - `region` must not have been released before
    /// - No pointers into the region may be used afterwards
    unsafe fn release(&self, region: Region) -> MemoryResult<()>;

    /// Number of successful allocations made by this allocator.
    fn allocation_count(&self) -> usize;

    /// Bytes currently allocated and not yet released.
    fn outstanding_bytes(&self) -> usize;

    /// Convenience wrapper building and validating the layout from raw
    /// size and alignment.
    fn allocate_bytes(&self, size: usize, align: usize) -> MemoryResult<Region> {
        if !align.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(align));
        }
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| MemoryError::size_overflow(size, align))?;
        self.allocate(layout)
    }
}

/// Which strategy an [`Allocator`] was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Every allocation is a direct system mapping request
    Page,
    /// Bump allocation from a growing chunk chain, bulk reclaim only
    Arena,
    /// Bump allocation from a caller-supplied buffer that never grows
    FixedBuffer,
    /// Ledger-backed allocator that detects release misuse and leaks
    GeneralPurpose,
    /// Thin wrapper over the platform allocator, no misuse detection
    Passthrough,
}

impl StrategyKind {
    /// Short stable name, for diagnostics and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Arena => "arena",
            Self::FixedBuffer => "fixed-buffer",
            Self::GeneralPurpose => "general-purpose",
            Self::Passthrough => "passthrough",
        }
    }
}

impl core::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An allocation strategy chosen at construction time.
///
/// # Examples
///
/// ```
/// use crucible_memory::prelude::*;
///
/// let allocator = Allocator::fixed_buffer(1024)?;
/// let region = allocator.allocate_bytes(64, 8)?;
/// assert_eq!(region.len(), 64);
/// unsafe { allocator.release(region)? };
/// # Ok::<(), crucible_memory::MemoryError>(())
/// ```
#[derive(Debug)]
pub enum Allocator {
    /// See [`PageAllocator`]
    Page(PageAllocator),
    /// See [`ArenaAllocator`]
    Arena(ArenaAllocator),
    /// See [`FixedBufferAllocator`]
    FixedBuffer(FixedBufferAllocator),
    /// See [`GeneralPurposeAllocator`]
    GeneralPurpose(GeneralPurposeAllocator),
    /// See [`PassthroughAllocator`]
    Passthrough(PassthroughAllocator),
}

impl Allocator {
    /// Page-mapping strategy: every request goes straight to the system.
    #[must_use]
    pub fn page() -> Self {
        Self::Page(PageAllocator::new())
    }

    /// Arena strategy with the given configuration.
    pub fn arena(config: ArenaConfig) -> MemoryResult<Self> {
        Ok(Self::Arena(ArenaAllocator::with_config(config)?))
    }

    /// Fixed-buffer strategy backed by a fresh buffer of `capacity` bytes.
    pub fn fixed_buffer(capacity: usize) -> MemoryResult<Self> {
        Ok(Self::FixedBuffer(FixedBufferAllocator::with_capacity(
            capacity,
        )?))
    }

    /// Fixed-buffer strategy over a caller-supplied buffer.
    #[must_use]
    pub fn fixed_buffer_from(buffer: Box<[u8]>) -> Self {
        Self::FixedBuffer(FixedBufferAllocator::from_boxed_slice(buffer))
    }

    /// Ledger-backed strategy that detects double release and leaks.
    #[must_use]
    pub fn general_purpose() -> Self {
        Self::GeneralPurpose(GeneralPurposeAllocator::new())
    }

    /// Thin platform-allocator wrapper with minimal bookkeeping.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::Passthrough(PassthroughAllocator::new())
    }

    /// Which strategy this allocator was built with.
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Page(_) => StrategyKind::Page,
            Self::Arena(_) => StrategyKind::Arena,
            Self::FixedBuffer(_) => StrategyKind::FixedBuffer,
            Self::GeneralPurpose(_) => StrategyKind::GeneralPurpose,
            Self::Passthrough(_) => StrategyKind::Passthrough,
        }
    }

    /// Tears the allocator down.
    ///
    /// The arena reclaims every outstanding region in this one operation.
    /// The other tracking strategies report a leak if regions are still
    /// outstanding; the passthrough strategy tracks nothing and always
    /// succeeds.
    pub fn destroy(self) -> MemoryResult<()> {
        match self {
            Self::Page(inner) => inner.destroy(),
            Self::Arena(inner) => inner.destroy(),
            Self::FixedBuffer(inner) => inner.destroy(),
            Self::GeneralPurpose(inner) => inner.destroy(),
            Self::Passthrough(inner) => inner.destroy(),
        }
    }
}

impl AllocStrategy for Allocator {
    fn allocate(&self, layout: Layout) -> MemoryResult<Region> {
        match self {
            Self::Page(inner) => inner.allocate(layout),
            Self::Arena(inner) => inner.allocate(layout),
            Self::FixedBuffer(inner) => inner.allocate(layout),
            Self::GeneralPurpose(inner) => inner.allocate(layout),
            Self::Passthrough(inner) => inner.allocate(layout),
        }
    }

    unsafe fn release(&self, region: Region) -> MemoryResult<()> {
        // SAFETY: forwarded contract — the caller's obligations are exactly
        // those of the underlying strategy.
        unsafe {
            match self {
                Self::Page(inner) => inner.release(region),
                Self::Arena(inner) => inner.release(region),
                Self::FixedBuffer(inner) => inner.release(region),
                Self::GeneralPurpose(inner) => inner.release(region),
                Self::Passthrough(inner) => inner.release(region),
            }
        }
    }

    fn allocation_count(&self) -> usize {
        match self {
            Self::Page(inner) => inner.allocation_count(),
            Self::Arena(inner) => inner.allocation_count(),
            Self::FixedBuffer(inner) => inner.allocation_count(),
            Self::GeneralPurpose(inner) => inner.allocation_count(),
            Self::Passthrough(inner) => inner.allocation_count(),
        }
    }

    fn outstanding_bytes(&self) -> usize {
        match self {
            Self::Page(inner) => inner.outstanding_bytes(),
            Self::Arena(inner) => inner.outstanding_bytes(),
            Self::FixedBuffer(inner) => inner.outstanding_bytes(),
            Self::GeneralPurpose(inner) => inner.outstanding_bytes(),
            Self::Passthrough(inner) => inner.outstanding_bytes(),
        }
    }
}

impl StatisticsProvider for Allocator {
    fn statistics(&self) -> AllocatorStats {
        match self {
            Self::Page(inner) => inner.statistics(),
            Self::Arena(inner) => inner.statistics(),
            Self::FixedBuffer(inner) => inner.statistics(),
            Self::GeneralPurpose(inner) => inner.statistics(),
            Self::Passthrough(inner) => inner.statistics(),
        }
    }

    fn reset_statistics(&self) {
        match self {
            Self::Page(inner) => inner.reset_statistics(),
            Self::Arena(inner) => inner.reset_statistics(),
            Self::FixedBuffer(inner) => inner.reset_statistics(),
            Self::GeneralPurpose(inner) => inner.reset_statistics(),
            Self::Passthrough(inner) => inner.reset_statistics(),
        }
    }
}
