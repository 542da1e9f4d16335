//! Error types for memory strategy operations
//!
//! One taxonomy for the whole crate: allocation failures, release misuse,
//! leak reports, and guard poisoning all surface as [`MemoryError`].

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Memory strategy errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The backing store refused or exhausted the request.
    ///
    /// Recoverable: pick a different strategy, or release prior regions.
    #[error("out of memory: requested {requested} bytes{}", available.map(|a| format!(" ({a} available)")).unwrap_or_default())]
    OutOfMemory {
        requested: usize,
        available: Option<usize>,
    },

    /// A region was released twice, released to the wrong allocator, or
    /// described with a layout that does not match what was issued.
    #[error("invalid release of region at {address:#x}: {reason}")]
    InvalidRelease { address: usize, reason: String },

    /// An allocator was destroyed while regions were still outstanding.
    #[error("leak detected: {regions} outstanding region(s), {bytes} bytes")]
    LeakDetected { regions: usize, bytes: usize },

    /// A previous holder of the exclusive guard terminated abnormally;
    /// the guarded state may be inconsistent.
    #[error("lock poisoned: {resource}")]
    LockPoisoned { resource: &'static str },

    /// Layout parameters were rejected before any allocation was attempted.
    #[error("invalid layout: {reason}")]
    InvalidLayout { reason: String },

    /// Alignment is not a power of two, or exceeds what the strategy supports.
    #[error("invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    /// Size arithmetic overflowed.
    #[error("size overflow: {size} bytes with {align} byte alignment")]
    SizeOverflow { size: usize, align: usize },

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MemoryError {
    /// Check if the error is worth retrying after freeing resources or
    /// switching strategies. Misuse and poisoning are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "MEM:ALLOC:OOM",
            Self::InvalidRelease { .. } => "MEM:RELEASE:INVALID",
            Self::LeakDetected { .. } => "MEM:RELEASE:LEAK",
            Self::LockPoisoned { .. } => "MEM:LOCK:POISONED",
            Self::InvalidLayout { .. } => "MEM:LAYOUT:INVALID",
            Self::InvalidAlignment { .. } => "MEM:LAYOUT:ALIGN",
            Self::SizeOverflow { .. } => "MEM:LAYOUT:OVERFLOW",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
        }
    }

    // --- Allocation errors ---

    /// Create an out of memory error
    #[must_use]
    pub fn out_of_memory(requested: usize) -> Self {
        Self::OutOfMemory {
            requested,
            available: None,
        }
    }

    /// Create an out of memory error with known headroom
    #[must_use]
    pub fn out_of_memory_with_available(requested: usize, available: usize) -> Self {
        Self::OutOfMemory {
            requested,
            available: Some(available),
        }
    }

    // --- Release errors ---

    /// Create an invalid release error
    pub fn invalid_release(address: usize, reason: &str) -> Self {
        #[cfg(feature = "logging")]
        error!(address, reason, "invalid release");

        Self::InvalidRelease {
            address,
            reason: reason.to_string(),
        }
    }

    /// Create a leak report
    #[must_use]
    pub fn leak_detected(regions: usize, bytes: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(regions, bytes, "leak detected on destroy");

        Self::LeakDetected { regions, bytes }
    }

    // --- Synchronization errors ---

    /// Create a lock poisoned error
    #[must_use]
    pub fn lock_poisoned(resource: &'static str) -> Self {
        #[cfg(feature = "logging")]
        warn!(resource, "lock poisoned");

        Self::LockPoisoned { resource }
    }

    // --- Layout errors ---

    /// Create an invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }

    /// Create an invalid alignment error
    #[must_use]
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create a size overflow error
    #[must_use]
    pub fn size_overflow(size: usize, align: usize) -> Self {
        Self::SizeOverflow { size, align }
    }

    // --- Configuration errors ---

    /// Create an invalid configuration error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_sizes() {
        let err = MemoryError::out_of_memory_with_available(1024, 512);
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("512"));

        let err = MemoryError::out_of_memory(64);
        assert!(!err.to_string().contains("available"));
    }

    #[test]
    fn invalid_release_formats_address_as_hex() {
        let err = MemoryError::invalid_release(0xdead_beef, "double release");
        assert!(err.to_string().contains("0xdeadbeef"));
        assert!(err.to_string().contains("double release"));
    }

    #[test]
    fn error_codes() {
        assert_eq!(MemoryError::out_of_memory(1).code(), "MEM:ALLOC:OOM");
        assert_eq!(
            MemoryError::lock_poisoned("counter").code(),
            "MEM:LOCK:POISONED"
        );
        assert_eq!(MemoryError::leak_detected(2, 128).code(), "MEM:RELEASE:LEAK");
    }

    #[test]
    fn retryable_classification() {
        assert!(MemoryError::out_of_memory(1).is_retryable());
        assert!(!MemoryError::invalid_release(0, "x").is_retryable());
        assert!(!MemoryError::lock_poisoned("counter").is_retryable());
    }
}
