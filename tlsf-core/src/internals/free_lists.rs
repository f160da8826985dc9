//! The table of segregated free lists.
//!
//! Each size class owns a circular doubly-linked list of free blocks, threaded through the payload of the blocks. An
//! empty list, and both ends of a non-empty list, point to the null block of the table rather than to nothing.
//!
//! The bitmap is kept in sync with the lists: a class' bit is set if and only if its list is non-empty.

use super::{
    bitmap::Bitmap,
    block::Block,
    size_class::{Geometry, SizeClass},
};

/// FreeLists
pub(crate) struct FreeLists<'a> {
    null: Block,
    heads: &'a mut [Block],
    bitmap: Bitmap<'a>,
    geometry: Geometry,
}

impl<'a> FreeLists<'a> {
    /// Creates an instance, with all lists empty.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `null` is a null block, as created by `Block::initialize_null`.
    pub(crate) unsafe fn new(null: Block, heads: &'a mut [Block], rows: &'a mut [u32], geometry: Geometry) -> Self {
        debug_assert_eq!(geometry.number_classes(), heads.len());
        debug_assert_eq!(geometry.first_level_count(), rows.len());
        debug_assert!(null.is_free() && null.is_last());

        heads.iter_mut().for_each(|head| *head = null);

        Self { null, heads, bitmap: Bitmap::new(rows), geometry }
    }

    /// Returns the geometry.
    pub(crate) fn geometry(&self) -> &Geometry { &self.geometry }

    /// Returns the null block.
    pub(crate) fn null(&self) -> Block { self.null }

    /// Returns the bitmap.
    pub(crate) fn bitmap(&self) -> &Bitmap<'a> { &self.bitmap }

    /// Returns the head of the list of `class`, or the null block if empty.
    pub(crate) fn head(&self, class: SizeClass) -> Block { self.heads[self.geometry.index_of(class)] }

    /// Pushes a free block at the front of the list of its class.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `block` is free, and not already in a list.
    pub(crate) unsafe fn insert(&mut self, block: Block) {
        let class = self.geometry.class_for_insert(block.size());
        let index = self.geometry.index_of(class);
        let current = self.heads[index];

        debug_assert!(block != self.null);
        debug_assert!(block.address() % super::block::WORD == 0, "Misaligned block {:x}", block.address());

        let free = block.as_free();
        free.set_next_in_list(current);
        free.set_prev_in_list(self.null);

        current.as_free().set_prev_in_list(block);

        self.heads[index] = block;
        self.bitmap.set(class);
    }

    /// Unlinks a free block from the list of its class.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `block` is free, and in the list of its class.
    pub(crate) unsafe fn remove(&mut self, block: Block) {
        let class = self.geometry.class_for_insert(block.size());
        let index = self.geometry.index_of(class);

        let free = block.as_free();
        let (prev, next) = (free.prev_in_list(), free.next_in_list());

        debug_assert!(block != self.null);

        next.as_free().set_prev_in_list(prev);
        prev.as_free().set_next_in_list(next);

        if self.heads[index] == block {
            self.heads[index] = next;

            if next == self.null {
                self.bitmap.clear(class);
            }
        }
    }

    /// Returns a free block of at least `size` bytes, if any, without unlinking it.
    ///
    /// The block is the head of the first non-empty list whose class guarantees `size` bytes.
    pub(crate) fn find_suitable(&self, size: usize) -> Option<Block> {
        let class = self.geometry.class_for_search(size);
        let found = self.bitmap.find(class)?;

        let head = self.head(found);
        debug_assert!(head != self.null, "Class {:?} is flagged, yet empty", found);

        Some(head)
    }
}

// mod tests
