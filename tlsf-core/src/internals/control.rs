//! Control
//!
//! The Control structure ties the free lists, the pools and the boundary-tag protocol together, implementing
//! allocation, release and resizing.
//!
//! #   Layout
//!
//! The address-sensitive parts of the Control structure are carved out of caller-supplied memory:
//!
//! ```text
//! +------------+-----------------------------+--------------------------------+
//! | null block | heads: [Block; fl * sl]     | rows: [u32; fl] (word-padded)  |
//! +------------+-----------------------------+--------------------------------+
//! ```
//!
//! Every free list points to the null block when empty, hence it must not move; the Control value itself, holding
//! the first-level bitmap and the pool chain, can be moved freely.
//!
//! #   Complexity
//!
//! Apart from the copy performed when a block cannot be resized in place, every operation completes in a bounded
//! number of steps, whatever the number of blocks or pools.

use core::{
    cmp,
    mem::MaybeUninit,
    ptr::{self, NonNull},
    slice,
};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

use crate::{Error, PowerOf2, Violation};
use crate::utils::is_sufficiently_aligned_for;
use crate::api::configuration::{BLOCK_SIZE_MIN, GAP_MINIMUM, POOL_OVERHEAD};

use super::{
    block::{Block, WORD},
    check,
    free_lists::FreeLists,
    pool::{Pool, PoolChain},
    region::Region,
    size_class::Geometry,
};

/// Control
pub(crate) struct Control<'a> {
    lists: FreeLists<'a>,
    pools: PoolChain,
}

impl<'a> Control<'a> {
    /// In-place constructs the address-sensitive parts of the Control structure, and returns it.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `memory` is aligned on a word.
    /// -   Assumes that `memory` is at least `geometry.control_size()` bytes.
    pub(crate) unsafe fn initialize(memory: &'a mut [MaybeUninit<u8>], geometry: Geometry) -> Self {
        debug_assert!(memory.len() >= geometry.control_size());

        let region = Region::from_slice(memory);
        debug_assert!(region.address() % WORD == 0);

        let null = Block::initialize_null(region.at(0));

        let number_heads = geometry.number_classes();
        let number_rows = geometry.first_level_count();

        #[allow(clippy::cast_ptr_alignment)]
        let heads = region.at(3 * WORD).as_ptr() as *mut Block;

        for index in 0..number_heads {
            ptr::write(heads.add(index), null);
        }

        #[allow(clippy::cast_ptr_alignment)]
        let rows = region.at(3 * WORD + number_heads * WORD).as_ptr() as *mut u32;

        for index in 0..number_rows {
            ptr::write(rows.add(index), 0);
        }

        //  Safety:
        //  -   All elements have been initialized above.
        //  -   The 3 parts do not overlap.
        let heads = slice::from_raw_parts_mut(heads, number_heads);
        let rows = slice::from_raw_parts_mut(rows, number_rows);

        #[cfg(feature = "tracing")]
        debug!(address = region.address(), size = geometry.control_size(), "control structure created");

        Self { lists: FreeLists::new(null, heads, rows, geometry), pools: PoolChain::default() }
    }

    /// Returns the free lists.
    pub(crate) fn lists(&self) -> &FreeLists<'a> { &self.lists }

    /// Returns the chain of pools.
    pub(crate) fn pools(&self) -> &PoolChain { &self.pools }

    /// Returns the identifier recorded in each pool registered with this instance.
    pub(crate) fn owner(&self) -> usize { self.lists.null().address() }

    /// Validates and registers a new pool.
    ///
    /// No state is modified if an error is returned.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `memory` remains exclusively accessible to this instance until the pool is removed.
    pub(crate) unsafe fn add_pool(&mut self, memory: &mut [MaybeUninit<u8>]) -> Result<Pool, Error> {
        let region = Region::from_slice(memory);

        if region.address() % WORD != 0 {
            return Err(Error::MisalignedRegion { address: region.address(), alignment: WORD });
        }

        let minimum = POOL_OVERHEAD + BLOCK_SIZE_MIN;

        if region.length() < minimum {
            return Err(Error::PoolTooSmall { length: region.length(), minimum });
        }

        let maximum = POOL_OVERHEAD + (self.lists.geometry().max_block_size() - WORD);

        if region.length() > maximum {
            return Err(Error::PoolTooLarge { length: region.length(), maximum });
        }

        let pool = Pool::initialize(region, self.owner());

        self.lists.insert(pool.first_block());
        self.pools.push(pool);

        #[cfg(feature = "tracing")]
        debug!(address = pool.address(), length = region.length(), pools = self.pools.len(), "pool added");

        Ok(pool)
    }

    /// Unregisters a pool, returning its region.
    ///
    /// No state is modified if an error is returned.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `pool` was returned by `add_pool`, on this or another instance, and not removed since.
    pub(crate) unsafe fn remove_pool(&mut self, pool: Pool) -> Result<Region, Error> {
        if pool.owner() != self.owner() {
            return Err(Error::UnknownPool);
        }

        if !pool.is_empty() {
            return Err(Error::PoolNotEmpty);
        }

        self.lists.remove(pool.first_block());
        self.pools.unlink(pool);

        #[cfg(feature = "tracing")]
        debug!(address = pool.address(), pools = self.pools.len(), "pool removed");

        Ok(pool.region())
    }

    /// Allocates a block of at least `size` bytes, aligned on a word.
    ///
    /// Returns None if `size` is 0, or if no block is available.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let adjusted = self.lists.geometry().adjust_request_size(size)?;

        //  Safety:
        //  -   The free lists only contain valid free blocks.
        unsafe {
            let block = self.locate_free(adjusted)?;

            Some(self.prepare_used(block, adjusted))
        }
    }

    /// Allocates a block of at least `size` bytes, aligned on `alignment`.
    ///
    /// Returns None if `size` is 0, or if no block is available.
    pub(crate) fn allocate_aligned(&mut self, size: usize, alignment: PowerOf2) -> Option<NonNull<u8>> {
        if alignment.value() <= WORD {
            return self.allocate(size);
        }

        let geometry = self.lists.geometry();

        let adjusted = geometry.adjust_request_size(size)?;
        let with_gap = geometry.search_size(size, alignment)?;

        //  Safety:
        //  -   The free lists only contain valid free blocks.
        unsafe {
            let mut block = self.locate_free(with_gap)?;

            let payload = block.payload().as_ptr() as usize;
            let mut gap = (alignment.value() - payload % alignment) % alignment;

            if gap != 0 && gap < GAP_MINIMUM {
                //  Skip to a further aligned address, `aligned + offset` rounded up.
                let offset = cmp::max(GAP_MINIMUM - gap, alignment.value());

                gap += (offset + alignment.value() - 1) / alignment.value() * alignment.value();
            }

            if gap != 0 {
                debug_assert!(gap >= GAP_MINIMUM, "Gap of {} bytes is too small", gap);

                block = self.trim_free_leading(block, gap);
            }

            let result = self.prepare_used(block, adjusted);

            debug_assert_eq!(payload + gap, result.as_ptr() as usize);
            debug_assert!(is_sufficiently_aligned_for(result, alignment));

            Some(result)
        }
    }

    /// Releases a block.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned` or `resize` on this instance, and not
    ///     released since.
    pub(crate) unsafe fn release(&mut self, ptr: NonNull<u8>) {
        debug_assert!(is_sufficiently_aligned_for(ptr, PowerOf2::align_of::<usize>()),
            "Misaligned pointer {:x}", ptr.as_ptr() as usize);

        let block = Block::from_payload(ptr);

        debug_assert!(!block.is_free(), "Block {:x} released twice", block.address());

        block.mark_as_free();

        let block = self.merge_prev(block);
        let block = self.merge_next(block);

        self.lists.insert(block);
    }

    /// Resizes a block to at least `size` bytes, in place if possible, and otherwise by moving it to a new block
    /// aligned on `alignment`.
    ///
    /// A `size` of 0 releases the block and returns None. Otherwise, if None is returned, the block is untouched.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned` or `resize` on this instance, and not
    ///     released since.
    /// -   Assumes that `ptr` is aligned on `alignment`.
    pub(crate) unsafe fn resize(&mut self, ptr: NonNull<u8>, size: usize, alignment: PowerOf2)
        -> Option<NonNull<u8>>
    {
        if size == 0 {
            self.release(ptr);
            return None;
        }

        let block = Block::from_payload(ptr);

        debug_assert!(!block.is_free(), "Block {:x} resized after release", block.address());

        let adjusted = self.lists.geometry().adjust_request_size(size)?;
        let current = block.size();

        if adjusted > current {
            let next = block.next();

            if !next.is_free() || adjusted > current + WORD + next.size() {
                let moved = self.allocate_aligned(size, alignment)?;

                ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), cmp::min(current, size));
                self.release(ptr);

                return Some(moved);
            }

            self.merge_next(block);
            block.mark_as_used();
        }

        self.trim_used(block, adjusted);

        Some(ptr)
    }

    /// Returns the usable size of a block.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned` or `resize` on this instance, and not
    ///     released since.
    pub(crate) unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize {
        let block = Block::from_payload(ptr);

        debug_assert!(!block.is_free(), "Block {:x} queried after release", block.address());

        block.size()
    }

    /// Checks the invariants of the free lists and of all pools, calling `fun` for each violation.
    ///
    /// Returns the number of violations.
    pub(crate) fn check_with<F>(&self, fun: F) -> usize
        where
            F: FnMut(Violation),
    {
        check::check(&self.lists, &self.pools, fun)
    }

    //  Returns a free block of at least `size` bytes, unlinked from its free list.
    unsafe fn locate_free(&mut self, size: usize) -> Option<Block> {
        let block = self.lists.find_suitable(size);

        #[cfg(feature = "tracing")]
        if block.is_none() {
            trace!(size, "no suitable free block");
        }

        let block = block?;
        debug_assert!(block.size() >= size, "Block {:x} too small: {} < {}", block.address(), block.size(), size);

        self.lists.remove(block);

        Some(block)
    }

    //  Trims a block unlinked from its free list down to `size` bytes, and marks it used.
    unsafe fn prepare_used(&mut self, block: Block, size: usize) -> NonNull<u8> {
        self.trim_free(block, size);
        block.mark_as_used();

        block.payload()
    }

    //  Splits the excess of a free block, unlinked from its free list, into a new free block.
    unsafe fn trim_free(&mut self, block: Block, size: usize) {
        debug_assert!(block.is_free());

        if block.can_split(size) {
            let remaining = block.split(size);

            block.link_next();
            remaining.set_prev_free();

            self.lists.insert(remaining);
        }
    }

    //  Splits the excess of a used block into a new free block, coalescing it with its successor.
    unsafe fn trim_used(&mut self, block: Block, size: usize) {
        debug_assert!(!block.is_free());

        if block.can_split(size) {
            let remaining = block.split(size);
            remaining.set_prev_used();

            let remaining = self.merge_next(remaining);
            self.lists.insert(remaining);
        }
    }

    //  Splits the leading `gap` bytes of a free block, unlinked from its free list, into a new free block.
    //
    //  Returns the trailing part, whose payload is `gap` bytes after the original payload.
    unsafe fn trim_free_leading(&mut self, block: Block, gap: usize) -> Block {
        debug_assert!(block.is_free());
        debug_assert!(block.can_split(gap - WORD), "Block {:x} too small for a gap of {}", block.address(), gap);

        let remaining = block.split(gap - WORD);

        remaining.set_prev_free();
        block.link_next();

        self.lists.insert(block);

        remaining
    }

    //  Coalesces a free block with its predecessor, if free.
    unsafe fn merge_prev(&mut self, block: Block) -> Block {
        if !block.is_prev_free() {
            return block;
        }

        let prev = block.prev();
        debug_assert!(prev.is_free(), "Block {:x} is flagged free, yet used", prev.address());

        self.lists.remove(prev);
        prev.absorb(block);

        prev
    }

    //  Coalesces a block with its successor, if free.
    unsafe fn merge_next(&mut self, block: Block) -> Block {
        let next = block.next();

        if next.is_free() {
            self.lists.remove(next);
            block.absorb(next);
        }

        block
    }
}

// mod tests
