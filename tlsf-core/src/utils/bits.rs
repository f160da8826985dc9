//! Bit-scan primitives.
//!
//! Both primitives compile down to a single instruction (`tzcnt`/`lzcnt`, `rbit`+`clz`, ...) on all mainstream
//! targets, and to a small constant-time sequence otherwise.

/// Bit-scan over a fixed-width word.
pub(crate) trait BitScan: Copy {
    /// Returns the index of the lowest set bit, or None if `self` is 0.
    fn lowest_set(self) -> Option<usize>;

    /// Returns the index of the highest set bit, or None if `self` is 0.
    fn highest_set(self) -> Option<usize>;
}

macro_rules! impl_bit_scan {
    ($($t:ty),*) => {
        $(
            impl BitScan for $t {
                #[inline(always)]
                fn lowest_set(self) -> Option<usize> {
                    if self == 0 { None } else { Some(self.trailing_zeros() as usize) }
                }

                #[inline(always)]
                fn highest_set(self) -> Option<usize> {
                    const BITS: usize = core::mem::size_of::<$t>() * 8;

                    if self == 0 { None } else { Some(BITS - 1 - self.leading_zeros() as usize) }
                }
            }
        )*
    };
}

impl_bit_scan!(u32, usize);

/// Returns the index of the lowest set bit of `word`, if any.
#[inline(always)]
pub(crate) fn find_first_set<W: BitScan>(word: W) -> Option<usize> { word.lowest_set() }

/// Returns the index of the highest set bit of `word`, if any.
#[inline(always)]
pub(crate) fn find_last_set<W: BitScan>(word: W) -> Option<usize> { word.highest_set() }

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn bits_find_first_set() {
    assert_eq!(None, find_first_set(0u32));
    assert_eq!(Some(0), find_first_set(1u32));
    assert_eq!(Some(31), find_first_set(0x8000_0000u32));
    assert_eq!(Some(3), find_first_set(0x8000_0008u32));
    assert_eq!(Some(0), find_first_set(0x7FFF_FFFFu32));

    assert_eq!(None, find_first_set(0usize));
    assert_eq!(Some(4), find_first_set(0b1_0000usize));
    assert_eq!(Some(core::mem::size_of::<usize>() * 8 - 1), find_first_set(1usize.rotate_right(1)));
}

#[test]
fn bits_find_last_set() {
    assert_eq!(None, find_last_set(0u32));
    assert_eq!(Some(0), find_last_set(1u32));
    assert_eq!(Some(31), find_last_set(0x8000_0000u32));
    assert_eq!(Some(31), find_last_set(0x8000_0008u32));
    assert_eq!(Some(30), find_last_set(0x7FFF_FFFFu32));

    assert_eq!(None, find_last_set(0usize));
    assert_eq!(Some(4), find_last_set(0b1_0000usize));
    assert_eq!(Some(12), find_last_set(0x1FFFusize));
    assert_eq!(Some(core::mem::size_of::<usize>() * 8 - 1), find_last_set(usize::MAX));
}

}
