//! Platform Memory Interface.
//!
//! A thin abstraction over the host's virtual-memory primitives
//! (`reserve`/`commit`/`decommit`/`release`/`page_size`) and, for the
//! chunked-heap backend, a pointer-width-aligned heap `alloc`/`free`.
//!
//! - **Linux**: `mmap`/`mprotect`/`madvise`/`munmap` via `rustix`.
//! - **Other Unix (incl. macOS)**: the same calls via `libc`.
//! - **Windows**: `VirtualAlloc`/`VirtualFree` via `windows-sys`.
//! - **Everything else**: a heap-backed fallback where reserve and commit
//!   collapse into a single allocation (see `sys::reserve`'s docs).

/// Error type for system memory allocation failures.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("system memory allocation failed")]
pub struct AllocFailed;

/// Platform-specific memory allocation functions.
pub mod sys {
    use super::AllocFailed;

    pub use imp::{commit, decommit, page_size, release, reserve};

    #[cfg(target_os = "linux")]
    mod imp {
        use super::AllocFailed;
        use rustix::mm::{
            madvise, mmap_anonymous, mprotect, munmap, Advice, MapFlags, MprotectFlags, ProtFlags,
        };
        use std::ffi::c_void;
        use std::ptr;

        pub fn reserve(size: usize) -> Result<*mut u8, AllocFailed> {
            debug_assert!(size > 0);
            unsafe {
                mmap_anonymous(
                    ptr::null_mut(),
                    size,
                    ProtFlags::empty(),
                    MapFlags::PRIVATE | MapFlags::NORESERVE,
                )
                .map(|p| p as *mut u8)
                .map_err(|_| AllocFailed)
            }
        }

        pub fn commit(ptr: *mut u8, size: usize) -> Result<(), AllocFailed> {
            debug_assert!(size > 0);
            unsafe {
                mprotect(ptr as *mut c_void, size, MprotectFlags::READ | MprotectFlags::WRITE)
                    .map_err(|_| AllocFailed)
            }
        }

        pub unsafe fn decommit(ptr: *mut u8, size: usize) {
            let _ = mprotect(ptr as *mut c_void, size, MprotectFlags::empty());
            let _ = madvise(ptr as *mut c_void, size, Advice::DontNeed);
        }

        pub unsafe fn release(ptr: *mut u8, size: usize) {
            let _ = munmap(ptr as *mut c_void, size);
        }

        pub fn page_size() -> usize {
            rustix::param::page_size()
        }
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    mod imp {
        use super::AllocFailed;
        use std::ptr;

        pub fn reserve(size: usize) -> Result<*mut u8, AllocFailed> {
            debug_assert!(size > 0);
            unsafe {
                let ptr = libc::mmap(
                    ptr::null_mut(),
                    size,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANON,
                    -1,
                    0,
                );
                if ptr == libc::MAP_FAILED {
                    Err(AllocFailed)
                } else {
                    Ok(ptr as *mut u8)
                }
            }
        }

        pub fn commit(ptr: *mut u8, size: usize) -> Result<(), AllocFailed> {
            debug_assert!(size > 0);
            unsafe {
                if libc::mprotect(ptr as *mut libc::c_void, size, libc::PROT_READ | libc::PROT_WRITE) == 0 {
                    Ok(())
                } else {
                    Err(AllocFailed)
                }
            }
        }

        pub unsafe fn decommit(ptr: *mut u8, size: usize) {
            let _ = libc::mprotect(ptr as *mut libc::c_void, size, libc::PROT_NONE);
            let _ = libc::madvise(ptr as *mut libc::c_void, size, libc::MADV_DONTNEED);
        }

        pub unsafe fn release(ptr: *mut u8, size: usize) {
            let _ = libc::munmap(ptr as *mut libc::c_void, size);
        }

        pub fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
        }
    }

    #[cfg(windows)]
    mod imp {
        use super::AllocFailed;
        use std::ptr;
        use windows_sys::Win32::System::Memory::{
            VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
            PAGE_NOACCESS, PAGE_READWRITE,
        };
        use windows_sys::Win32::System::SystemInformation::GetSystemInfo;

        pub fn reserve(size: usize) -> Result<*mut u8, AllocFailed> {
            debug_assert!(size > 0);
            let ptr = unsafe { VirtualAlloc(ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
            if ptr.is_null() {
                Err(AllocFailed)
            } else {
                Ok(ptr as *mut u8)
            }
        }

        pub fn commit(ptr: *mut u8, size: usize) -> Result<(), AllocFailed> {
            debug_assert!(size > 0);
            let out = unsafe { VirtualAlloc(ptr as *const _, size, MEM_COMMIT, PAGE_READWRITE) };
            if out.is_null() {
                Err(AllocFailed)
            } else {
                Ok(())
            }
        }

        pub unsafe fn decommit(ptr: *mut u8, size: usize) {
            let _ = VirtualFree(ptr as *mut _, size, MEM_DECOMMIT);
        }

        pub unsafe fn release(ptr: *mut u8, _size: usize) {
            let _ = VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
        }

        pub fn page_size() -> usize {
            unsafe {
                let mut info = std::mem::zeroed();
                GetSystemInfo(&mut info);
                info.dwPageSize as usize
            }
        }
    }

    /// Fallback for platforms with no virtual-memory primitives (e.g. wasm).
    ///
    /// `reserve` eagerly heap-allocates the whole region since there is no
    /// lazy-commit mechanism to fall back on; `commit` is then always a
    /// no-op success and `decommit` is a no-op. `page_size` is the 4096
    /// compile-time constant the spec allows for this case.
    #[cfg(not(any(unix, windows)))]
    mod imp {
        use super::AllocFailed;
        use std::alloc::{alloc_zeroed, dealloc, Layout};

        const FALLBACK_ALIGN: usize = 16;

        pub fn reserve(size: usize) -> Result<*mut u8, AllocFailed> {
            debug_assert!(size > 0);
            let layout = Layout::from_size_align(size, FALLBACK_ALIGN).map_err(|_| AllocFailed)?;
            let ptr = unsafe { alloc_zeroed(layout) };
            if ptr.is_null() {
                Err(AllocFailed)
            } else {
                Ok(ptr)
            }
        }

        pub fn commit(_ptr: *mut u8, _size: usize) -> Result<(), AllocFailed> {
            Ok(())
        }

        pub unsafe fn decommit(_ptr: *mut u8, _size: usize) {}

        pub unsafe fn release(ptr: *mut u8, size: usize) {
            if let Ok(layout) = Layout::from_size_align(size, FALLBACK_ALIGN) {
                dealloc(ptr, layout);
            }
        }

        pub fn page_size() -> usize {
            4096
        }
    }
}

/// Pointer-width-aligned heap allocation for the chunked backend's nodes.
pub fn heap_alloc(size: usize) -> Result<*mut u8, AllocFailed> {
    debug_assert!(size > 0);
    let align = std::mem::align_of::<usize>();
    let layout = std::alloc::Layout::from_size_align(size, align).map_err(|_| AllocFailed)?;
    let ptr = unsafe { std::alloc::alloc(layout) };
    if ptr.is_null() {
        Err(AllocFailed)
    } else {
        Ok(ptr)
    }
}

/// # Safety
/// `ptr` must have been returned by [`heap_alloc`] with the same `size`.
pub unsafe fn heap_free(ptr: *mut u8, size: usize) {
    let align = std::mem::align_of::<usize>();
    if let Ok(layout) = std::alloc::Layout::from_size_align(size, align) {
        std::alloc::dealloc(ptr, layout);
    }
}
