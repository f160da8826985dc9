#![no_std]
#![deny(missing_docs)]

//! Exposition of TlsfAllocator API via a C ABI.

use core::{alloc::Layout, mem, ptr::{self, NonNull}};

use tlsf::TlsfAllocator;

/// Prepares the heap for allocation, mapping its control structure and a first pool.
///
/// Returns 0 on success, and a negative value otherwise.
#[cold]
#[no_mangle]
pub extern fn tlsf_warm_up() -> i32 { if ALLOCATOR.warm_up().is_ok() { 0 } else { -1 } }

/// Ensures that at least `target` bytes of pools are mapped.
///
/// Returns the number of bytes of pools mapped, which may be less than `target` if the OS refuses to map more.
#[cold]
#[no_mangle]
pub extern fn tlsf_reserve(target: usize) -> usize { ALLOCATOR.reserve(target) }

/// Allocates `size` bytes of memory, aligned on the size of a pointer.
///
/// Returns NULL if `size` is 0, or if the allocation fails.
#[no_mangle]
pub extern fn tlsf_malloc(size: usize) -> *mut u8 {
    match Layout::from_size_align(size, WORD) {
        Ok(layout) => into_raw(ALLOCATOR.allocate(layout)),
        Err(_) => ptr::null_mut(),
    }
}

/// Allocates `size` bytes of memory, aligned on `alignment`.
///
/// Returns NULL if `alignment` is not a power of 2, if `size` is 0, or if the allocation fails.
#[no_mangle]
pub extern fn tlsf_memalign(alignment: usize, size: usize) -> *mut u8 {
    match Layout::from_size_align(size, alignment) {
        Ok(layout) => into_raw(ALLOCATOR.allocate(layout)),
        Err(_) => ptr::null_mut(),
    }
}

/// Resizes the memory located at `pointer` to `size` bytes, in place if possible.
///
/// -   If `pointer` is NULL, behaves as `tlsf_malloc(size)`.
/// -   If `size` is 0, behaves as `tlsf_free(pointer)`, and returns NULL.
/// -   If the resize fails, returns NULL, and the memory located at `pointer` is untouched.
///
/// A moved block is aligned on the size of a pointer, whatever the alignment of the original block.
///
/// #   Safety
///
/// -   Assumes `pointer` is NULL, or has been returned by a prior call to an allocation function.
/// -   Assumes `pointer` has not been deallocated since its allocation.
#[no_mangle]
pub unsafe extern fn tlsf_realloc(pointer: *mut u8, size: usize) -> *mut u8 {
    let pointer = match NonNull::new(pointer) {
        Some(pointer) => pointer,
        None => return tlsf_malloc(size),
    };

    if size == 0 {
        ALLOCATOR.deallocate(pointer);
        return ptr::null_mut();
    }

    //  Safety:
    //  -   `WORD` is a non-zero power of 2, and a multiple of itself.
    let layout = Layout::from_size_align_unchecked(WORD, WORD);

    into_raw(ALLOCATOR.reallocate(pointer, layout, size))
}

/// Deallocates the memory located at `pointer`; does nothing if `pointer` is NULL.
///
/// #   Safety
///
/// -   Assumes `pointer` is NULL, or has been returned by a prior call to an allocation function.
/// -   Assumes `pointer` has not been deallocated since its allocation.
/// -   Assumes the memory pointed by `pointer` is no longer in use.
#[no_mangle]
pub unsafe extern fn tlsf_free(pointer: *mut u8) {
    if let Some(pointer) = NonNull::new(pointer) {
        ALLOCATOR.deallocate(pointer);
    }
}

/// Returns the usable size of the memory located at `pointer`, or 0 if `pointer` is NULL.
///
/// #   Safety
///
/// -   Assumes `pointer` is NULL, or has been returned by a prior call to an allocation function.
/// -   Assumes `pointer` has not been deallocated since its allocation.
#[no_mangle]
pub unsafe extern fn tlsf_block_size(pointer: *mut u8) -> usize {
    NonNull::new(pointer).map(|pointer| ALLOCATOR.block_size(pointer)).unwrap_or(0)
}

/// Checks the integrity of the heap, returning the number of violations found.
#[cold]
#[no_mangle]
pub extern fn tlsf_check() -> usize { ALLOCATOR.check() }

/// Returns the empty pools to the OS, returning their number.
#[cold]
#[no_mangle]
pub extern fn tlsf_trim() -> usize { ALLOCATOR.trim() }

//
//  Implementation
//

const WORD: usize = mem::size_of::<usize>();

static ALLOCATOR: TlsfAllocator = TlsfAllocator::new();

fn into_raw(pointer: Option<NonNull<u8>>) -> *mut u8 { pointer.map(NonNull::as_ptr).unwrap_or(ptr::null_mut()) }
