//! API of OS required services.

use core::alloc::Layout;

use tlsf_core::PowerOf2;

/// Sizing of the regions requested from the OS.
pub(crate) trait RegionConfiguration {
    /// The granularity of the regions, and their alignment.
    const PAGE_SIZE: PowerOf2;

    /// The default size of a region backing a pool.
    ///
    /// Larger requests get a larger region, up to the maximum pool size.
    const REGION_SIZE: PowerOf2;

    /// The maximum number of pools the heap keeps track of.
    const MAXIMUM_POOLS: usize;
}

/// Abstraction over OS services.
pub(crate) trait Platform: Send + Sync {
    /// Requests a region of memory from the OS.
    ///
    /// Returns a null pointer on failure.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `layout.size()` is a multiple of `layout.align()`, and `layout.align()` at most a page.
    unsafe fn allocate(&self, layout: Layout) -> *mut u8;

    /// Returns a region of memory to the OS.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `pointer` was returned by `allocate`, with the same `layout`.
    /// -   Assumes that the region is no longer in use.
    unsafe fn deallocate(&self, pointer: *mut u8, layout: Layout);
}
