//! Blocks
//!
//! A Block represents a unit of allocation, carved out of a pool.
//!
//! Note: Blocks are never _constructed_, instead raw memory is reinterpreted as blocks.
//!
//! #   Layout
//!
//! A Block is addressed by its header, a single word holding its size and 2 status bits:
//!
//! ```text
//!            header   payload
//!           +--------+-----------+-----------+-- ... --+-------------+
//!   used:   | size|s | user data                                      |
//!           +--------+-----------+-----------+-- ... --+-------------+
//!   free:   | size|s | next free | prev free |   ...   | tag (self)  |
//!           +--------+-----------+-----------+-- ... --+-------------+
//!                                                                     ^ next physical block header
//! ```
//!
//! -   The next physical block is located at `header + WORD + size`; no pointer is stored.
//! -   The previous physical block can only be located if it is free, by reading its boundary tag, which is the word
//!     immediately preceding this block's header. Whether the previous block is free is recorded in this block's own
//!     status bits.
//!
//! A used block thus has an overhead of a single word, whilst a free block requires a payload of at least 3 words.
//!
//! #   Views
//!
//! The status bits select the view of the header:
//!
//! -   The used view only exposes the size and status bits.
//! -   The free view, `FreeBlock`, also exposes the free-list links; it is only handed out for free blocks, which is
//!     checked in debug builds.

use core::ptr::{self, NonNull};

use crate::api::configuration::{ALIGN_SIZE, BLOCK_SIZE_MIN};

/// Size of the header, and granularity of all sizes.
pub(crate) const WORD: usize = ALIGN_SIZE;

const FREE_BIT: usize = 1 << 0;
const PREV_FREE_BIT: usize = 1 << 1;
const STATUS_MASK: usize = FREE_BIT | PREV_FREE_BIT;

/// Block
///
/// A handle to the header of a block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub(crate) struct Block(NonNull<usize>);

impl Block {
    /// Reinterprets the memory as a Block header, without modifying it.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `at` points to a block header, or to memory about to become one.
    /// -   Assumes that `at` is aligned on a word.
    pub(crate) unsafe fn from_raw(at: NonNull<u8>) -> Block {
        debug_assert!(at.as_ptr() as usize % WORD == 0, "Misaligned header: {:x}", at.as_ptr() as usize);

        Block(at.cast())
    }

    /// In-place constructs a header for a block of `size` bytes, with both status bits cleared.
    ///
    /// #   Safety
    ///
    /// -   Assumes that access to the memory location is exclusive.
    /// -   Assumes that `at` is aligned on a word.
    pub(crate) unsafe fn initialize(at: NonNull<u8>, size: usize) -> Block {
        debug_assert!(size % WORD == 0, "Unaligned size: {}", size);

        let block = Block::from_raw(at);
        ptr::write(block.0.as_ptr(), size);

        block
    }

    /// In-place constructs the null block, a zero-sized free block linked to itself.
    ///
    /// #   Safety
    ///
    /// -   Assumes that access to the 3 words pointed to is exclusive.
    /// -   Assumes that `at` is aligned on a word.
    pub(crate) unsafe fn initialize_null(at: NonNull<u8>) -> Block {
        let block = Block::initialize(at, 0);
        block.set_free();

        let free = block.as_free();
        free.set_next_in_list(block);
        free.set_prev_in_list(block);

        block
    }

    /// Recovers the Block from the pointer to its payload.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `payload` was obtained from `Block::payload`.
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> Block {
        Block::from_raw(NonNull::new_unchecked(payload.as_ptr().sub(WORD)))
    }

    /// Returns the address of the header.
    pub(crate) fn address(&self) -> usize { self.0.as_ptr() as usize }

    /// Returns a pointer to the header.
    pub(crate) fn as_ptr(&self) -> NonNull<u8> { self.0.cast() }

    /// Returns a pointer to the payload.
    pub(crate) fn payload(&self) -> NonNull<u8> {
        //  Safety:
        //  -   A header is always followed by its payload, or is the end sentinel of a pool, hence never at the very
        //      end of the address space.
        unsafe { NonNull::new_unchecked(self.as_ptr().as_ptr().wrapping_add(WORD)) }
    }

    //
    //  Used view.
    //

    /// Returns the size of the payload.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn size(&self) -> usize { self.header() & !STATUS_MASK }

    /// Sets the size of the payload, preserving the status bits.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn set_size(&self, size: usize) {
        debug_assert!(size % WORD == 0, "Unaligned size: {}", size);

        self.set_header(size | (self.header() & STATUS_MASK));
    }

    /// Returns whether this is the end sentinel of a pool, or the null block.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn is_last(&self) -> bool { self.size() == 0 }

    /// Returns whether the block is free.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn is_free(&self) -> bool { self.header() & FREE_BIT != 0 }

    /// Returns whether the previous physical block is free.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn is_prev_free(&self) -> bool { self.header() & PREV_FREE_BIT != 0 }

    /// Marks the block as free, without touching its neighbours.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn set_free(&self) { self.set_header(self.header() | FREE_BIT); }

    /// Marks the block as used, without touching its neighbours.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn set_used(&self) { self.set_header(self.header() & !FREE_BIT); }

    /// Records that the previous physical block is free.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn set_prev_free(&self) { self.set_header(self.header() | PREV_FREE_BIT); }

    /// Records that the previous physical block is used.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn set_prev_used(&self) { self.set_header(self.header() & !PREV_FREE_BIT); }

    //
    //  Adjacency.
    //

    /// Returns the next physical block.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid, and is not the end sentinel of its pool.
    pub(crate) unsafe fn next(&self) -> Block {
        debug_assert!(!self.is_last(), "No block after {:x}", self.address());

        Block::from_raw(NonNull::new_unchecked(self.payload().as_ptr().add(self.size())))
    }

    /// Returns the previous physical block, by reading its boundary tag.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid, and the previous block is free.
    pub(crate) unsafe fn prev(&self) -> Block {
        debug_assert!(self.is_prev_free(), "Previous block of {:x} is not free", self.address());

        Block(NonNull::new_unchecked(ptr::read(self.tag_slot())))
    }

    /// Writes the boundary tag of `self` in front of the next physical block, and returns the latter.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid, and is not the end sentinel of its pool.
    /// -   Assumes that the last word of the payload is no longer in use.
    pub(crate) unsafe fn link_next(&self) -> Block {
        let next = self.next();
        ptr::write(next.tag_slot(), self.0.as_ptr());

        next
    }

    /// Marks the block as free, and records it in the next physical block.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid, and is not the end sentinel of its pool.
    /// -   Assumes that the payload is no longer in use.
    pub(crate) unsafe fn mark_as_free(&self) {
        let next = self.link_next();
        next.set_prev_free();
        self.set_free();
    }

    /// Marks the block as used, and records it in the next physical block.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid, and is not the end sentinel of its pool.
    pub(crate) unsafe fn mark_as_used(&self) {
        let next = self.next();
        next.set_prev_used();
        self.set_used();
    }

    //
    //  Boundary-tag protocol.
    //

    /// Returns whether the block is large enough to be split in a block of `size` bytes and another block.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn can_split(&self, size: usize) -> bool {
        self.size() >= size + WORD + BLOCK_SIZE_MIN
    }

    /// Splits the block in 2, shrinking `self` to `size` bytes, and returns the remainder.
    ///
    /// The remainder is marked free, its previous-free bit is left cleared for the caller to set.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    /// -   Assumes that `self.can_split(size)`.
    /// -   Assumes that the bytes past `size` in the payload are no longer in use.
    pub(crate) unsafe fn split(&self, size: usize) -> Block {
        debug_assert!(self.can_split(size), "Cannot split {:x} ({}) at {}", self.address(), self.size(), size);

        let remaining_size = self.size() - (size + WORD);
        let remaining = Block::initialize(NonNull::new_unchecked(self.payload().as_ptr().add(size)), remaining_size);

        self.set_size(size);
        remaining.mark_as_free();

        remaining
    }

    /// Absorbs the next physical block, which must be free and already unlinked from its free list.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid, and `next` is `self.next()`.
    pub(crate) unsafe fn absorb(&self, next: Block) {
        debug_assert!(self.next() == next, "{:x} does not follow {:x}", next.address(), self.address());

        self.set_size(self.size() + next.size() + WORD);
        self.link_next();
    }

    //
    //  Free view.
    //

    /// Returns the free view of the block.
    ///
    /// #   Safety
    ///
    /// -   Assumes the header is valid.
    pub(crate) unsafe fn as_free(&self) -> FreeBlock {
        debug_assert!(self.is_free(), "Block {:x} is not free", self.address());

        FreeBlock(*self)
    }

    unsafe fn header(&self) -> usize { ptr::read(self.0.as_ptr()) }

    unsafe fn set_header(&self, header: usize) { ptr::write(self.0.as_ptr(), header) }

    //  The word preceding the header, holding the boundary tag of the previous block when it is free.
    unsafe fn tag_slot(&self) -> *mut *mut usize { self.0.as_ptr().sub(1) as *mut *mut usize }
}

/// FreeBlock
///
/// The free view of a block, exposing its free-list links.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FreeBlock(Block);

impl FreeBlock {
    /// Returns the next block in the free list.
    pub(crate) fn next_in_list(&self) -> Block {
        //  Safety:
        //  -   Free blocks are at least 3 words, the view is only handed out for free blocks.
        unsafe { Block(NonNull::new_unchecked(ptr::read(self.link_slot(1)))) }
    }

    /// Returns the previous block in the free list.
    pub(crate) fn prev_in_list(&self) -> Block {
        //  Safety:
        //  -   Free blocks are at least 3 words, the view is only handed out for free blocks.
        unsafe { Block(NonNull::new_unchecked(ptr::read(self.link_slot(2)))) }
    }

    /// Sets the next block in the free list.
    pub(crate) fn set_next_in_list(&self, block: Block) {
        //  Safety:
        //  -   Free blocks are at least 3 words, the view is only handed out for free blocks.
        unsafe { ptr::write(self.link_slot(1), block.0.as_ptr()) }
    }

    /// Sets the previous block in the free list.
    pub(crate) fn set_prev_in_list(&self, block: Block) {
        //  Safety:
        //  -   Free blocks are at least 3 words, the view is only handed out for free blocks.
        unsafe { ptr::write(self.link_slot(2), block.0.as_ptr()) }
    }

    fn link_slot(&self, index: usize) -> *mut *mut usize {
        (self.0).0.as_ptr().wrapping_add(index) as *mut *mut usize
    }
}

#[cfg(test)]
mod tests {

use super::*;

//  A word-aligned buffer, to carve blocks from.
struct Buffer([usize; 64]);

impl Default for Buffer {
    fn default() -> Self { Buffer([0; 64]) }
}

impl Buffer {
    fn at(&mut self, word: usize) -> NonNull<u8> { NonNull::from(&mut self.0[word]).cast() }
}

//  Lays out [used sentinel][block of `words` words][end sentinel], returns the block.
unsafe fn carve(buffer: &mut Buffer, words: usize) -> Block {
    let sentinel = Block::initialize(buffer.at(1), 0);

    let block = Block::initialize(buffer.at(2), words * WORD);
    let end = Block::initialize(buffer.at(3 + words), 0);

    assert_eq!(sentinel.payload(), block.as_ptr());
    assert_eq!(end, block.next());

    block
}

#[test]
fn block_initialize() {
    let mut buffer = Buffer::default();

    let block = unsafe { Block::initialize(buffer.at(0), 4 * WORD) };

    unsafe {
        assert_eq!(4 * WORD, block.size());
        assert!(!block.is_free());
        assert!(!block.is_prev_free());
        assert!(!block.is_last());
    }
}

#[test]
fn block_status_bits() {
    let mut buffer = Buffer::default();

    let block = unsafe { Block::initialize(buffer.at(0), 4 * WORD) };

    unsafe {
        block.set_free();
        assert!(block.is_free());
        assert!(!block.is_prev_free());

        block.set_prev_free();
        assert!(block.is_prev_free());
        assert_eq!(4 * WORD, block.size());

        block.set_size(6 * WORD);
        assert_eq!(6 * WORD, block.size());
        assert!(block.is_free());
        assert!(block.is_prev_free());

        block.set_used();
        block.set_prev_used();
        assert!(!block.is_free());
        assert!(!block.is_prev_free());
    }
}

#[test]
fn block_payload_round_trip() {
    let mut buffer = Buffer::default();

    let block = unsafe { Block::initialize(buffer.at(2), 4 * WORD) };
    let payload = block.payload();

    assert_eq!(block.address() + WORD, payload.as_ptr() as usize);
    assert_eq!(block, unsafe { Block::from_payload(payload) });
}

#[test]
fn block_mark_as_free_used() {
    let mut buffer = Buffer::default();

    unsafe {
        let block = carve(&mut buffer, 8);
        let end = block.next();

        block.mark_as_free();

        assert!(block.is_free());
        assert!(end.is_prev_free());
        assert_eq!(block, end.prev());

        block.mark_as_used();

        assert!(!block.is_free());
        assert!(!end.is_prev_free());
    }
}

#[test]
fn block_split_absorb() {
    let mut buffer = Buffer::default();

    unsafe {
        let block = carve(&mut buffer, 16);
        let end = block.next();

        assert!(block.can_split(12 * WORD));
        assert!(!block.can_split(13 * WORD));

        let remaining = block.split(4 * WORD);

        assert_eq!(4 * WORD, block.size());
        assert_eq!(11 * WORD, remaining.size());
        assert_eq!(remaining, block.next());
        assert_eq!(end, remaining.next());

        assert!(remaining.is_free());
        assert!(end.is_prev_free());
        assert_eq!(remaining, end.prev());

        block.absorb(remaining);

        assert_eq!(16 * WORD, block.size());
        assert_eq!(end, block.next());
    }
}

#[test]
fn block_null() {
    let mut buffer = Buffer::default();

    let null = unsafe { Block::initialize_null(buffer.at(0)) };

    unsafe {
        assert!(null.is_last());
        assert!(null.is_free());

        let free = null.as_free();
        assert_eq!(null, free.next_in_list());
        assert_eq!(null, free.prev_in_list());
    }
}

#[test]
fn free_block_links() {
    let mut buffer = Buffer::default();

    unsafe {
        let a = Block::initialize(buffer.at(0), 4 * WORD);
        let b = Block::initialize(buffer.at(8), 4 * WORD);
        let c = Block::initialize(buffer.at(16), 4 * WORD);

        a.set_free();

        let free = a.as_free();
        free.set_next_in_list(b);
        free.set_prev_in_list(c);

        assert_eq!(b, free.next_in_list());
        assert_eq!(c, free.prev_in_list());

        //  Links live in the payload, leaving the header untouched.
        assert_eq!(4 * WORD, a.size());
        assert!(a.is_free());
    }
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn block_as_free_on_used_block() {
    let mut buffer = Buffer::default();

    let block = unsafe { Block::initialize(buffer.at(0), 4 * WORD) };
    let _ = unsafe { block.as_free() };
}

} // mod tests
