//! Handles to pools, and the blocks they contain.

use core::{fmt, marker::PhantomData, mem::MaybeUninit, ptr::NonNull};

use crate::internals::pool::Pool;

/// PoolHandle
///
/// A handle to a pool registered with a `Tlsf` instance, standing in for the memory of the pool until it is removed.
///
/// A handle is neither `Clone` nor `Copy`: it is consumed by `Tlsf::remove_pool`, which returns the memory.
pub struct PoolHandle<'a> {
    pool: Pool,
    _memory: PhantomData<&'a mut [MaybeUninit<u8>]>,
}

#[allow(clippy::len_without_is_empty)]
impl<'a> PoolHandle<'a> {
    /// Returns the start of the memory of the pool.
    pub fn start(&self) -> NonNull<u8> { self.pool.region().start() }

    /// Returns the length of the memory of the pool, in bytes.
    pub fn len(&self) -> usize { self.pool.region().length() }

    pub(crate) fn new(pool: Pool) -> Self { Self { pool, _memory: PhantomData } }

    pub(crate) fn pool(&self) -> Pool { self.pool }
}

impl<'a> fmt::Debug for PoolHandle<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle").field("start", &self.start()).field("len", &self.len()).finish()
    }
}

//  Safety:
//  -   The handle logically owns the memory of the pool, which may be sent across threads.
unsafe impl<'a> Send for PoolHandle<'a> {}

/// BlockInfo
///
/// A block of a pool, as reported by `Tlsf::walk_pool`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BlockInfo {
    /// The payload of the block, as returned by `allocate` for a used block.
    pub pointer: NonNull<u8>,
    /// The size of the payload, in bytes.
    pub size: usize,
    /// Whether the block is used.
    pub used: bool,
}
