//! Pools
//!
//! A Pool is a caller-supplied region of memory, from which blocks are carved.
//!
//! #   Layout
//!
//! ```text
//! +--------+--------+--------+--------+----------+--------+----------------------+----------+
//! |  next  |  prev  | owner  | length | sentinel | header | payload ...          | sentinel |
//! +--------+--------+--------+--------+----------+--------+----------------------+----------+
//! \_________________ record _________/ \_ start _/ \_______ interior block _____/ \_ end ___/
//! ```
//!
//! Both sentinels are zero-sized used blocks, preventing coalescing from crossing the edges of the pool.
//!
//! The records of all the pools registered with a control structure are chained in an intrusive doubly-linked list,
//! allowing to walk all the pools without any further memory.

use core::ptr::{self, NonNull};

use crate::api::configuration::POOL_OVERHEAD;

use super::{
    block::{Block, WORD},
    region::Region,
};

//  Offsets of the start sentinel and interior block, in words.
const START_SENTINEL: usize = 4;
const INTERIOR: usize = 5;

/// The record at the head of each pool.
#[repr(C)]
pub(crate) struct PoolRecord {
    next: Option<NonNull<PoolRecord>>,
    prev: Option<NonNull<PoolRecord>>,
    owner: usize,
    length: usize,
}

/// Pool
///
/// A handle to a registered pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Pool(NonNull<PoolRecord>);

impl Pool {
    /// Returns the size of the interior block of a pool of `length` bytes, if large enough.
    pub(crate) fn interior_size(length: usize) -> Option<usize> {
        (length / WORD * WORD).checked_sub(POOL_OVERHEAD)
    }

    /// In-place constructs a pool, whose interior block is free but not yet inserted in any list.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `region` is exclusively accessible, for as long as the pool is registered.
    /// -   Assumes that `region` is aligned on a word, and sufficiently large.
    pub(crate) unsafe fn initialize(region: Region, owner: usize) -> Pool {
        debug_assert!(region.address() % WORD == 0);

        let size = Self::interior_size(region.length()).unwrap_or(0);
        debug_assert!(size > 0);

        #[allow(clippy::cast_ptr_alignment)]
        let record = region.start().as_ptr() as *mut PoolRecord;
        ptr::write(record, PoolRecord { next: None, prev: None, owner, length: region.length() });

        let start = Block::initialize(region.at(START_SENTINEL * WORD), 0);
        debug_assert_eq!(start.payload(), region.at(INTERIOR * WORD));

        let interior = Block::initialize(region.at(INTERIOR * WORD), size);
        let end = Block::initialize(region.at(INTERIOR * WORD + WORD + size), 0);

        interior.mark_as_free();

        debug_assert!(end.is_prev_free());
        debug_assert!(region.contains(end.as_ptr()));

        Pool(NonNull::new_unchecked(record))
    }

    /// Returns the address of the pool.
    pub(crate) fn address(&self) -> usize { self.0.as_ptr() as usize }

    /// Returns the region of the pool.
    pub(crate) fn region(&self) -> Region { Region::new(self.0.cast(), self.record().length) }

    /// Returns the owner of the pool.
    pub(crate) fn owner(&self) -> usize { self.record().owner }

    /// Returns the start sentinel.
    pub(crate) fn start_sentinel(&self) -> Block {
        //  Safety:
        //  -   The offset is within the pool, and aligned.
        unsafe { Block::from_raw(self.region().at(START_SENTINEL * WORD)) }
    }

    /// Returns the first block of the interior.
    pub(crate) fn first_block(&self) -> Block {
        //  Safety:
        //  -   The offset is within the pool, and aligned.
        unsafe { Block::from_raw(self.region().at(INTERIOR * WORD)) }
    }

    /// Returns the end sentinel.
    pub(crate) fn end_sentinel(&self) -> Block {
        let region = self.region();
        let size = Self::interior_size(region.length()).unwrap_or(0);

        //  Safety:
        //  -   The offset is within the pool, and aligned.
        unsafe { Block::from_raw(region.at(INTERIOR * WORD + WORD + size)) }
    }

    /// Returns whether the pool is free of any allocation.
    ///
    /// #   Safety
    ///
    /// -   Assumes the pool is not corrupted.
    pub(crate) unsafe fn is_empty(&self) -> bool {
        let first = self.first_block();

        first.is_free() && first.next() == self.end_sentinel()
    }

    /// Calls `fun` for each block of the interior, in address order.
    ///
    /// Stops early, returning false, if a block overruns the pool.
    ///
    /// #   Safety
    ///
    /// -   Assumes the headers of the pool are valid.
    pub(crate) unsafe fn for_each_block<F>(&self, mut fun: F) -> bool
        where
            F: FnMut(Block),
    {
        let region = self.region();
        let end = self.end_sentinel();

        let mut block = self.first_block();

        while block != end {
            if !region.contains(block.as_ptr()) || block.is_last() || block.address() > end.address() {
                return false;
            }

            fun(block);

            if block.size() > end.address() - block.address() {
                return false;
            }

            block = block.next();
        }

        true
    }

    fn record(&self) -> &PoolRecord {
        //  Safety:
        //  -   The record lives as long as the pool is registered.
        unsafe { self.0.as_ref() }
    }

    fn record_mut(&mut self) -> &mut PoolRecord {
        //  Safety:
        //  -   The record lives as long as the pool is registered.
        unsafe { self.0.as_mut() }
    }
}

/// PoolChain
///
/// The intrusive list of pools registered with a control structure.
#[derive(Debug, Default)]
pub(crate) struct PoolChain {
    head: Option<Pool>,
    count: usize,
}

impl PoolChain {
    /// Returns the number of pools in the chain.
    pub(crate) fn len(&self) -> usize { self.count }

    /// Returns whether the chain is empty.
    pub(crate) fn is_empty(&self) -> bool { self.count == 0 }

    /// Pushes a pool at the front of the chain.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `pool` is not already in any chain.
    pub(crate) unsafe fn push(&mut self, mut pool: Pool) {
        let record = pool.record_mut();
        record.next = self.head.map(|p| p.0);
        record.prev = None;

        if let Some(mut head) = self.head {
            head.record_mut().prev = Some(pool.0);
        }

        self.head = Some(pool);
        self.count += 1;
    }

    /// Unlinks a pool from the chain.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `pool` is in this chain.
    pub(crate) unsafe fn unlink(&mut self, mut pool: Pool) {
        debug_assert!(self.count > 0);

        let (next, prev) = {
            let record = pool.record_mut();
            (record.next.take().map(Pool), record.prev.take().map(Pool))
        };

        if let Some(mut next) = next {
            next.record_mut().prev = prev.map(|p| p.0);
        }

        match prev {
            Some(mut prev) => prev.record_mut().next = next.map(|p| p.0),
            None => self.head = next,
        }

        self.count -= 1;
    }

    /// Returns an iterator over the pools of the chain.
    pub(crate) fn iter(&self) -> PoolIter<'_> { PoolIter { next: self.head, _chain: self } }
}

/// PoolIter
pub(crate) struct PoolIter<'a> {
    next: Option<Pool>,
    _chain: &'a PoolChain,
}

impl<'a> Iterator for PoolIter<'a> {
    type Item = Pool;

    fn next(&mut self) -> Option<Pool> {
        let current = self.next?;
        self.next = current.record().next.map(Pool);

        Some(current)
    }
}

// mod tests
