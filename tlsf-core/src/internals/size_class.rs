//! Mapping of sizes to size classes.
//!
//! A size class is identified by a (first-level, second-level) pair:
//!
//! -   Sizes below the small block size are mapped linearly, with a first-level of 0, and a second-level of
//!     `size / ALIGN_SIZE`.
//! -   Other sizes are mapped to the first-level of their highest bit, offset so that the first power of 2 above the
//!     small block size has a first-level of 1, and to the second-level given by the bits directly following the
//!     highest bit.
//!
//! The mapping is asymmetric:
//!
//! -   `class_for_insert` yields the class a block of exactly `size` bytes belongs to.
//! -   `class_for_search` first rounds `size` up to the next class boundary, so that any block of the resulting class,
//!     or above, is at least `size` bytes.

use crate::PowerOf2;
use crate::api::configuration::{ALIGN_SIZE, BLOCK_SIZE_MIN, GAP_MINIMUM};
use crate::utils::find_last_set;

/// A (first-level, second-level) pair.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub(crate) struct SizeClass {
    pub(crate) fl: usize,
    pub(crate) sl: usize,
}

impl SizeClass {
    /// Creates an instance.
    pub(crate) const fn new(fl: usize, sl: usize) -> Self { Self { fl, sl } }
}

/// Geometry
///
/// The validated geometry of the size classes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Geometry {
    second_level_log2: u32,
    first_level_shift: u32,
    first_level_count: usize,
}

impl Geometry {
    /// Creates an instance, or None if the parameters are out of the supported range.
    pub(crate) fn new(second_level_log2: u32, first_level_max: u32) -> Option<Self> {
        //  The second-level bitmaps are `u32`, and the first-level bitmap is an `usize`.
        const MAX_SECOND_LEVEL_LOG2: u32 = 5;
        const USIZE_BITS: u32 = (core::mem::size_of::<usize>() * 8) as u32;

        if second_level_log2 == 0 || second_level_log2 > MAX_SECOND_LEVEL_LOG2 {
            return None;
        }

        let first_level_shift = second_level_log2 + ALIGN_SIZE.trailing_zeros();

        if first_level_max <= first_level_shift || first_level_max >= USIZE_BITS {
            return None;
        }

        let first_level_count = (first_level_max - first_level_shift + 1) as usize;

        Some(Self { second_level_log2, first_level_shift, first_level_count })
    }

    /// Returns the number of first-level classes.
    pub(crate) fn first_level_count(&self) -> usize { self.first_level_count }

    /// Returns the number of second-level classes, per first-level class.
    pub(crate) fn second_level_count(&self) -> usize { 1 << self.second_level_log2 }

    /// Returns the total number of classes.
    pub(crate) fn number_classes(&self) -> usize { self.first_level_count * self.second_level_count() }

    /// Returns the threshold below which sizes are mapped linearly.
    pub(crate) fn small_block_size(&self) -> usize { 1 << self.first_level_shift }

    /// Returns the size of the largest block, exclusive.
    pub(crate) fn max_block_size(&self) -> usize {
        1 << (self.first_level_shift + self.first_level_count as u32 - 1)
    }

    /// Returns the number of bytes required to hold a control structure of this geometry.
    ///
    /// The layout is: the null block (3 words), the heads of the free lists (1 word each), and the second-level
    /// bitmaps (1 `u32` each), padded to a word.
    pub(crate) fn control_size(&self) -> usize {
        let null = 3 * ALIGN_SIZE;
        let heads = self.number_classes() * ALIGN_SIZE;
        let bitmaps = self.first_level_count * 4;

        null + heads + (bitmaps + ALIGN_SIZE - 1) / ALIGN_SIZE * ALIGN_SIZE
    }

    /// Returns the index of a class in a flattened table of classes.
    pub(crate) fn index_of(&self, class: SizeClass) -> usize {
        debug_assert!(self.is_valid(class), "{:?}", class);

        (class.fl << self.second_level_log2) + class.sl
    }

    /// Returns whether the class exists in this geometry.
    pub(crate) fn is_valid(&self, class: SizeClass) -> bool {
        class.fl < self.first_level_count && class.sl < self.second_level_count()
    }

    /// Returns the class a block of exactly `size` bytes belongs to.
    ///
    /// The resulting first-level may exceed the number of first-level classes if `size` is too large.
    pub(crate) fn class_for_insert(&self, size: usize) -> SizeClass {
        if size < self.small_block_size() {
            return SizeClass::new(0, size / ALIGN_SIZE);
        }

        //  `size` is not 0, as per the check above.
        let highest = find_last_set(size).unwrap_or(0);
        let sl = (size >> (highest - self.second_level_log2 as usize)) ^ self.second_level_count();
        let fl = highest - (self.first_level_shift as usize - 1);

        SizeClass::new(fl, sl)
    }

    /// Returns the smallest class whose blocks are all at least `size` bytes.
    ///
    /// The resulting first-level may exceed the number of first-level classes if `size` is too large.
    pub(crate) fn class_for_search(&self, size: usize) -> SizeClass {
        if size < self.small_block_size() {
            return self.class_for_insert(size);
        }

        let highest = find_last_set(size).unwrap_or(0);
        let round = (1 << (highest - self.second_level_log2 as usize)) - 1;

        self.class_for_insert(size.saturating_add(round))
    }

    /// Returns the minimum size of a block belonging to the class.
    pub(crate) fn minimum_size(&self, class: SizeClass) -> usize {
        if class.fl == 0 {
            return class.sl * ALIGN_SIZE;
        }

        let base = 1usize << (class.fl + self.first_level_shift as usize - 1);
        let step = base >> self.second_level_log2;

        base + class.sl * step
    }

    /// Returns the size of the block to carve for a request of `size` bytes, or None if it cannot be fulfilled.
    pub(crate) fn adjust_request_size(&self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }

        let aligned = PowerOf2::align_of::<usize>().round_up(size)?;

        if aligned >= self.max_block_size() {
            return None;
        }

        Some(core::cmp::max(aligned, BLOCK_SIZE_MIN))
    }

    /// Returns the size of the free block to search for, to carve a block of `size` bytes aligned on `alignment`.
    ///
    /// Above word alignment, the search leaves room for a free block of `GAP_MINIMUM` bytes in front of the aligned
    /// payload.
    pub(crate) fn search_size(&self, size: usize, alignment: PowerOf2) -> Option<usize> {
        let adjusted = self.adjust_request_size(size)?;

        if alignment.value() <= ALIGN_SIZE {
            return Some(adjusted);
        }

        let with_gap = adjusted.checked_add(alignment.value())?.checked_add(GAP_MINIMUM)?;

        self.adjust_request_size(alignment.round_up(with_gap)?)
    }

    /// Returns the size of the smallest free block guaranteed to be found for a request of `size` bytes aligned on
    /// `alignment`, or None if no block can ever serve it.
    pub(crate) fn block_size_for(&self, size: usize, alignment: PowerOf2) -> Option<usize> {
        let class = self.class_for_search(self.search_size(size, alignment)?);

        if !self.is_valid(class) {
            return None;
        }

        Some(self.minimum_size(class))
    }
}

#[cfg(test)]
impl Default for Geometry {
    fn default() -> Self {
        crate::Properties::<crate::DefaultConfiguration>::geometry().expect("Valid default geometry")
    }
}

#[cfg(test)]
impl Geometry {
    /// Returns the class directly above `class`.
    pub(crate) fn next_class(&self, class: SizeClass) -> SizeClass {
        if class.sl + 1 < self.second_level_count() {
            SizeClass::new(class.fl, class.sl + 1)
        } else {
            SizeClass::new(class.fl + 1, 0)
        }
    }
}
