//! The two-level bitmap indexing the non-empty free lists.
//!
//! A bit is set in the second-level row `fl` at position `sl` if and only if the free list of class `(fl, sl)` is
//! non-empty, and a bit is set in the first-level word at position `fl` if and only if the row `fl` is non-zero.
//!
//! Finding the first non-empty class at or above a given class thus takes at most 2 bit-scans.

use crate::utils::find_first_set;

use super::size_class::SizeClass;

/// Bitmap
pub(crate) struct Bitmap<'a> {
    first: usize,
    second: &'a mut [u32],
}

impl<'a> Bitmap<'a> {
    /// Creates an instance, with all bits cleared.
    pub(crate) fn new(second: &'a mut [u32]) -> Self {
        debug_assert!(second.len() <= core::mem::size_of::<usize>() * 8);

        second.iter_mut().for_each(|row| *row = 0);

        Self { first: 0, second }
    }

    /// Returns the first-level word.
    pub(crate) fn first_level(&self) -> usize { self.first }

    /// Returns the second-level row `fl`.
    pub(crate) fn second_level(&self, fl: usize) -> u32 { self.second[fl] }

    /// Returns the number of rows.
    pub(crate) fn number_rows(&self) -> usize { self.second.len() }

    /// Returns whether the bit of `class` is set.
    pub(crate) fn is_set(&self, class: SizeClass) -> bool { self.second[class.fl] & (1 << class.sl) != 0 }

    /// Sets the bit of `class`, and of its row.
    pub(crate) fn set(&mut self, class: SizeClass) {
        self.second[class.fl] |= 1 << class.sl;
        self.first |= 1 << class.fl;
    }

    /// Clears the bit of `class`, and of its row if it becomes empty.
    pub(crate) fn clear(&mut self, class: SizeClass) {
        self.second[class.fl] &= !(1 << class.sl);

        if self.second[class.fl] == 0 {
            self.first &= !(1 << class.fl);
        }
    }

    /// Returns the first class, at or after `from`, whose bit is set.
    ///
    /// Classes are ordered by first-level, then second-level.
    pub(crate) fn find(&self, from: SizeClass) -> Option<SizeClass> {
        if from.fl >= self.second.len() {
            return None;
        }

        let row = self.second[from.fl] & (!0u32).checked_shl(from.sl as u32).unwrap_or(0);

        if let Some(sl) = find_first_set(row) {
            return Some(SizeClass::new(from.fl, sl));
        }

        let rows = self.first & (!0usize).checked_shl(from.fl as u32 + 1).unwrap_or(0);
        let fl = find_first_set(rows)?;

        debug_assert!(self.second[fl] != 0, "Row {} is flagged, yet empty", fl);

        find_first_set(self.second[fl]).map(|sl| SizeClass::new(fl, sl))
    }
}

// mod tests
