//! Implementation of Linux specific calls.

use core::{alloc::Layout, ptr};

use tlsf_core::PowerOf2;

use super::{Platform, RegionConfiguration};

/// Implementation of the RegionConfiguration trait, for Linux.
#[derive(Default)]
pub(crate) struct TlsfConfiguration;

impl RegionConfiguration for TlsfConfiguration {
    //  4 KB
    const PAGE_SIZE: PowerOf2 = unsafe { PowerOf2::new_unchecked(4 * 1024) };

    //  4 MB
    const REGION_SIZE: PowerOf2 = unsafe { PowerOf2::new_unchecked(4 * 1024 * 1024) };

    const MAXIMUM_POOLS: usize = 64;
}

/// Implementation of the Platform trait, for Linux.
#[derive(Default)]
pub(crate) struct TlsfPlatform;

impl TlsfPlatform {
    /// Creates an instance.
    pub(crate) const fn new() -> Self { Self }
}

impl Platform for TlsfPlatform {
    unsafe fn allocate(&self, layout: Layout) -> *mut u8 {
        const PAGE_SIZE: PowerOf2 = TlsfConfiguration::PAGE_SIZE;

        assert!(layout.size() % PAGE_SIZE == 0,
            "Incorrect size: {} % {} != 0", layout.size(), PAGE_SIZE.value());
        assert!(layout.align() <= PAGE_SIZE.value(),
            "Incorrect alignment: {} > {}", layout.align(), PAGE_SIZE.value());

        let candidate = mmap_allocate(layout.size())
            .map(|pointer| pointer.as_ptr())
            .unwrap_or(ptr::null_mut());

        debug_assert!(candidate as usize % PAGE_SIZE == 0,
            "Incorrect alignment of allocation: {:x} % {:x} != 0", candidate as usize, PAGE_SIZE.value());

        candidate
    }

    unsafe fn deallocate(&self, pointer: *mut u8, layout: Layout) {
        munmap_deallocate(pointer, layout.size());
    }
}

//  Wrapper around `mmap`.
//
//  Returns a pointer to `size` bytes of zeroed memory, aligned on a page.
fn mmap_allocate(size: usize) -> Option<ptr::NonNull<u8>> {
    let length = size;
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    //  No specific address hint.
    let addr = ptr::null_mut();
    //  When used in conjunction with MAP_ANONYMOUS, fd is mandated to be -1 on some implementations.
    let fd = -1;
    //  When used in conjunction with MAP_ANONYMOUS, offset is mandated to be 0 on some implementations.
    let offset = 0;

    //  Safety:
    //  -   `addr`, `fd`, and `offset` are suitable for MAP_ANONYMOUS.
    let result = unsafe { libc::mmap(addr, length, prot, flags, fd, offset) };

    let result = if result != libc::MAP_FAILED { result as *mut u8 } else { ptr::null_mut() };
    ptr::NonNull::new(result)
}

//  Wrapper around `munmap`.
//
//  #   Panics
//
//  If `munmap` returns a non-0 result.
//
//  #   Safety
//
//  -   Assumes that `addr` points to a `mmap`ed area of at least `size` bytes.
//  -   Assumes that the range `[addr, addr + size)` is no longer in use.
unsafe fn munmap_deallocate(addr: *mut u8, size: usize) {
    let result = libc::munmap(addr as *mut libc::c_void, size);
    assert!(result == 0, "Could not munmap {:x}, {}: {}", addr as usize, size, result);
}
