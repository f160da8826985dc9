//! An alignment, guaranteed to be a power of 2.

use core::{mem, num, ops};

/// PowerOf2
///
/// An integral guaranteed to be non-zero and a power of 2, used to express alignments.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PowerOf2(num::NonZeroUsize);

impl PowerOf2 {
    /// Creates a new instance of PowerOf2.
    ///
    /// Or nothing if the value is not a power of 2.
    pub const fn new(value: usize) -> Option<PowerOf2> {
        if value.is_power_of_two() {
            //  Safety:
            //  -   Value is a power of 2, as per the if check.
            Some(unsafe { PowerOf2::new_unchecked(value) })
        } else {
            None
        }
    }

    /// Creates a new instance of PowerOf2.
    ///
    /// #   Safety
    ///
    /// Assumes that the value is a power of 2.
    pub const unsafe fn new_unchecked(value: usize) -> PowerOf2 {
        //  Safety:
        //  -   A power of 2 cannot be 0.
        PowerOf2(num::NonZeroUsize::new_unchecked(value))
    }

    /// Creates a PowerOf2 matching the alignment of a type.
    pub const fn align_of<T>() -> PowerOf2 {
        //  Safety:
        //  -   Alignment is always a power of 2, and never 0.
        unsafe { PowerOf2::new_unchecked(mem::align_of::<T>()) }
    }

    /// Returns the inner value.
    pub const fn value(&self) -> usize { self.0.get() }

    /// Returns the base-2 logarithm of the inner value.
    pub const fn log2(&self) -> u32 { self.value().trailing_zeros() }

    /// Rounds the value up to the nearest higher multiple of `self`, or None on overflow.
    pub const fn round_up(&self, n: usize) -> Option<usize> {
        let mask = self.mask();

        match n.checked_add(mask) {
            Some(n) => Some(n & !mask),
            None => None,
        }
    }

    /// Rounds the value down to the nearest lower multiple of `self`.
    pub const fn round_down(&self, n: usize) -> usize { n & !self.mask() }

    const fn mask(&self) -> usize { self.value() - 1 }
}

impl ops::Rem<PowerOf2> for usize {
    type Output = usize;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn rem(self, rhs: PowerOf2) -> usize { self & rhs.mask() }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn power_of_2_new() {
    fn new(value: usize) -> Option<usize> {
        PowerOf2::new(value).map(|p| p.value())
    }

    assert_eq!(None, new(0));
    assert_eq!(Some(1), new(1));
    assert_eq!(Some(2), new(2));
    assert_eq!(None, new(3));
    assert_eq!(Some(64), new(64));
    assert_eq!(None, new(96));
    assert_eq!(Some(1 << 20), new(1 << 20));
    assert_eq!(None, new(usize::MAX));
}

#[test]
fn power_of_2_log2() {
    fn log2(value: usize) -> u32 { PowerOf2::new(value).expect("Power of 2").log2() }

    assert_eq!(0, log2(1));
    assert_eq!(3, log2(8));
    assert_eq!(12, log2(4096));
}

#[test]
fn power_of_2_rem() {
    fn rem(pow2: usize, n: usize) -> usize {
        n % PowerOf2::new(pow2).expect("Power of 2")
    }

    assert_eq!(0, rem(1, 7));
    assert_eq!(0, rem(8, 0));
    assert_eq!(7, rem(8, 15));
    assert_eq!(0, rem(8, 16));
    assert_eq!(40, rem(64, 104));
}

#[test]
fn power_of_2_round_up() {
    fn round_up(pow2: usize, n: usize) -> Option<usize> {
        PowerOf2::new(pow2).expect("Power of 2").round_up(n)
    }

    assert_eq!(Some(0), round_up(8, 0));
    assert_eq!(Some(8), round_up(8, 1));
    assert_eq!(Some(8), round_up(8, 8));
    assert_eq!(Some(104), round_up(8, 100));
    assert_eq!(Some(4096), round_up(4096, 1));
    assert_eq!(None, round_up(8, usize::MAX - 3));
}

#[test]
fn power_of_2_round_down() {
    fn round_down(pow2: usize, n: usize) -> usize {
        PowerOf2::new(pow2).expect("Power of 2").round_down(n)
    }

    assert_eq!(0, round_down(8, 7));
    assert_eq!(8, round_down(8, 15));
    assert_eq!(96, round_down(8, 100));
    assert_eq!(65_536, round_down(4096, 65_537));
}

}
