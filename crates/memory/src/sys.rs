//! Platform memory primitives used by the page strategy.
//!
//! Thin wrappers over the OS mapping calls:
//! - **Unix**: `mmap`/`munmap` via libc, page size via `sysconf`
//! - **Windows**: `VirtualAlloc`/`VirtualFree`, page size via `GetSystemInfo`
//! - **Fallback**: `std::alloc` with a page-aligned layout
//!
//! # Safety
//!
//! Callers must ensure:
//! 1. Sizes passed to [`map_pages`]/[`unmap_pages`] are page-rounded
//! 2. Pointers passed to [`unmap_pages`] came from [`map_pages`]
//! 3. Each mapping is unmapped exactly once
//! 4. No reads or writes to a region after it was unmapped

use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

/// System page size, detected once and cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(detect_page_size)
}

#[cfg(unix)]
fn detect_page_size() -> usize {
    // SAFETY: FFI call to libc::sysconf.
    // - _SC_PAGESIZE is a valid sysconf parameter
    // - sysconf returns the page size or -1 on error
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

#[cfg(windows)]
fn detect_page_size() -> usize {
    use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};

    // SAFETY: FFI call to Windows GetSystemInfo.
    // - info is a properly sized, zeroed SYSTEM_INFO structure
    // - GetSystemInfo fills the structure and cannot fail
    unsafe {
        let mut info: SYSTEM_INFO = core::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    }
}

#[cfg(not(any(unix, windows)))]
fn detect_page_size() -> usize {
    4096
}

/// Requests `size` bytes (page-rounded by the caller) directly from the
/// system. The returned pointer is page-aligned and zero-initialized on
/// every supported platform.
pub(crate) fn map_pages(size: usize) -> io::Result<NonNull<u8>> {
    debug_assert!(size > 0 && size % page_size() == 0);

    #[cfg(unix)]
    {
        use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, mmap};

        // SAFETY: FFI call to mmap with a private anonymous mapping.
        // - addr is null (kernel chooses placement)
        // - size is non-zero and page-rounded (debug_assert above)
        // - fd -1 and offset 0 are required for MAP_ANONYMOUS
        let ptr = unsafe {
            mmap(
                core::ptr::null_mut(),
                size,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "mmap returned null"))
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};

        // SAFETY: FFI call to VirtualAlloc.
        // - lpAddress null lets the system choose placement
        // - size is non-zero and page-rounded
        // - MEM_RESERVE | MEM_COMMIT maps zeroed, committed pages
        let ptr = unsafe {
            VirtualAlloc(
                core::ptr::null_mut(),
                size,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            )
        };

        NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::alloc::{Layout, alloc_zeroed};

        let layout = Layout::from_size_align(size, page_size())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad mapping layout"))?;
        // SAFETY: layout is non-zero (debug_assert above) and valid.
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "allocation failed"))
    }
}

/// Returns a mapping obtained from [`map_pages`] to the system.
///
/// # Safety
///
/// - `ptr` must have been returned by [`map_pages`] with the same `size`
/// - The mapping must not have been unmapped already
/// - No pointers into the mapping may be used afterwards
pub(crate) unsafe fn unmap_pages(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
    debug_assert!(size > 0 && size % page_size() == 0);

    #[cfg(unix)]
    {
        // SAFETY: FFI call to munmap.
        // - ptr and size describe a live mapping (caller contract)
        let rc = unsafe { libc::munmap(ptr.as_ptr().cast(), size) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(windows)]
    {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_RELEASE;

        // SAFETY: FFI call to VirtualFree.
        // - ptr is the base address of a live VirtualAlloc mapping (caller contract)
        // - MEM_RELEASE requires dwSize of 0
        let rc = unsafe { VirtualFree(ptr.as_ptr().cast(), 0, MEM_RELEASE) };
        if rc != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::alloc::{Layout, dealloc};

        // SAFETY: ptr was allocated by map_pages with this exact layout
        // (caller contract).
        unsafe {
            dealloc(
                ptr.as_ptr(),
                Layout::from_size_align_unchecked(size, page_size()),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let size = page_size();
        assert!(size >= 512);
        assert!(size.is_power_of_two());
    }

    #[test]
    fn map_write_unmap() {
        let size = page_size();
        let ptr = map_pages(size).unwrap();

        unsafe {
            ptr.as_ptr().write(0xA5);
            ptr.as_ptr().add(size - 1).write(0x5A);
            assert_eq!(*ptr.as_ptr(), 0xA5);
            assert_eq!(*ptr.as_ptr().add(size - 1), 0x5A);

            unmap_pages(ptr, size).unwrap();
        }
    }
}
