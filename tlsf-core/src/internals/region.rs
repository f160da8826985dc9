//! A contiguous, byte-addressed, region of memory.
//!
//! Pointer arithmetic over whole pools goes through a Region, which checks bounds.

use core::{mem::MaybeUninit, ptr::NonNull};

/// Region
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Region {
    start: NonNull<u8>,
    length: usize,
}

impl Region {
    /// Creates an instance.
    pub(crate) fn new(start: NonNull<u8>, length: usize) -> Self {
        debug_assert!((start.as_ptr() as usize).checked_add(length).is_some());

        Self { start, length }
    }

    /// Creates an instance spanning the slice.
    pub(crate) fn from_slice(memory: &mut [MaybeUninit<u8>]) -> Self {
        let length = memory.len();

        Self::new(NonNull::from(memory).cast(), length)
    }

    /// Reconstitutes the slice spanned by the region.
    ///
    /// #   Safety
    ///
    /// -   Assumes the region was created with `from_slice` from a slice of lifetime `'a`.
    /// -   Assumes that no other reference to the memory is live.
    pub(crate) unsafe fn into_slice<'a>(self) -> &'a mut [MaybeUninit<u8>] {
        core::slice::from_raw_parts_mut(self.start.as_ptr() as *mut MaybeUninit<u8>, self.length)
    }

    /// Returns the start of the region.
    pub(crate) fn start(&self) -> NonNull<u8> { self.start }

    /// Returns the length of the region.
    pub(crate) fn length(&self) -> usize { self.length }

    /// Returns the address of the start of the region.
    pub(crate) fn address(&self) -> usize { self.start.as_ptr() as usize }

    /// Returns the address one past the end of the region.
    pub(crate) fn end(&self) -> usize { self.address() + self.length }

    /// Returns whether `ptr` lies within the region.
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        let address = ptr.as_ptr() as usize;

        self.address() <= address && address < self.end()
    }

    /// Returns a pointer `offset` bytes into the region.
    ///
    /// `offset` may be equal to the length of the region, to point one past its end.
    pub(crate) fn at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.length, "Offset {} out of region of {} bytes", offset, self.length);

        //  Safety:
        //  -   `offset` is within bounds, as per the assert above.
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(offset)) }
    }
}

// mod tests
