//! # crucible-memory
//!
//! Interchangeable memory allocation strategies behind one capability
//! interface, plus a synchronized counter for shared mutable state.
//!
//! Five strategies cover the usual lifetime/safety/performance tradeoffs:
//!
//! - [`PageAllocator`] — every call maps directly to a system-level
//!   memory request; no pooling
//! - [`ArenaAllocator`] — growing region, per-call release is a no-op,
//!   one `reset`/`destroy` reclaims everything at once
//! - [`FixedBufferAllocator`] — caller-supplied buffer that never grows
//! - [`GeneralPurposeAllocator`] — tracks every outstanding allocation to
//!   detect double release and leaks
//! - [`PassthroughAllocator`] — thin platform-allocator wrapper; fastest,
//!   weakest guarantees
//!
//! The strategy is a *value* ([`Allocator`]), chosen at construction
//! time, so tests can substitute one strategy for another behind the same
//! [`AllocStrategy`] calls.
//!
//! ## Quick start
//!
//! ```
//! use crucible_memory::prelude::*;
//!
//! // Pick a strategy by constructing its variant
//! let allocator = Allocator::fixed_buffer(4096)?;
//!
//! let region = allocator.allocate_bytes(256, 16)?;
//! assert_eq!(region.len(), 256);
//!
//! // SAFETY: the region came from this allocator and is released once
//! unsafe { allocator.release(region)? };
//! # Ok::<(), crucible_memory::MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): allocator lifecycle and misuse diagnostics via
//!   `tracing`

#![cfg_attr(docsrs, feature(doc_cfg))]
// Explicit lifetimes are clearer in unsafe/allocator code even when elidable
#![allow(clippy::elidable_lifetime_names)]
// Internal methods return Result for API consistency even when infallible today
#![allow(clippy::unnecessary_wraps)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod counter;
pub mod region;
pub mod stats;
pub mod sys;
pub mod utils;

// Re-export core types for convenience
pub use crate::allocator::{
    AllocStrategy, Allocator, ArenaAllocator, ArenaConfig, FixedBufferAllocator,
    GeneralPurposeAllocator, PageAllocator, PassthroughAllocator, StrategyKind,
};
pub use crate::counter::SharedCounter;
pub use crate::error::{MemoryError, MemoryResult};
pub use crate::region::{AllocatorId, Region};
pub use crate::stats::{AllocatorStats, StatisticsProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::allocator::{
        AllocStrategy, Allocator, ArenaAllocator, ArenaConfig, FixedBufferAllocator,
        GeneralPurposeAllocator, PageAllocator, PassthroughAllocator, StrategyKind,
    };
    pub use crate::counter::SharedCounter;
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::region::{AllocatorId, Region};
    pub use crate::stats::{AllocatorStats, StatisticsProvider};
}
