//! A collection of utilities.

use core::ptr::NonNull;

mod bits;
mod power_of_2;

pub(crate) use bits::{find_first_set, find_last_set};
pub use power_of_2::PowerOf2;

/// Returns whether the pointer is sufficiently aligned for the given alignment.
pub(crate) fn is_sufficiently_aligned_for(ptr: NonNull<u8>, alignment: PowerOf2) -> bool {
    (ptr.as_ptr() as usize) % alignment == 0
}

#[cfg(test)]
mod tests {

use crate::PowerOf2;

use super::*;

#[test]
fn is_sufficiently_aligned_for() {
    fn is_aligned_for(ptr: usize, alignment: usize) -> bool {
        let alignment = PowerOf2::new(alignment).unwrap();
        let ptr = NonNull::new(ptr as *mut u8).unwrap();
        super::is_sufficiently_aligned_for(ptr, alignment)
    }

    assert!(is_aligned_for(1, 1));
    assert!(is_aligned_for(3, 1));
    assert!(!is_aligned_for(3, 2));
    assert!(is_aligned_for(8, 8));
    assert!(!is_aligned_for(12, 8));
    assert!(is_aligned_for(64, 16));
    assert!(!is_aligned_for(72, 16));
}

} // mod tests
