//! Errors and invariant violations.
//!
//! Running out of memory is not an error: `allocate` and `resize` simply return `None`, and the caller may add a pool
//! and try again.
//!
//! Errors are only produced by the cold operations: creating the control structure, and adding or removing pools.
//! Each of them is reported before any state is modified.

use core::fmt;

use super::PoolHandle;

/// Error
///
/// The reasons a control structure or pool operation may be rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Error {
    /// The size-class geometry of the `Configuration` is out of the supported range.
    #[error("invalid size-class geometry: second-level log2 {second_level_log2}, first-level max {first_level_max}")]
    InvalidGeometry {
        /// `Configuration::SECOND_LEVEL_LOG2`.
        second_level_log2: u32,
        /// `Configuration::FIRST_LEVEL_MAX`.
        first_level_max: u32,
    },
    /// The memory supplied for the control structure is too small.
    #[error("control memory of {length} bytes is too small, {required} bytes required")]
    ControlTooSmall {
        /// Length of the supplied memory.
        length: usize,
        /// Required length, accounting for alignment.
        required: usize,
    },
    /// The memory supplied for a pool is too small to hold a single block.
    #[error("pool of {length} bytes is too small, at least {minimum} bytes required")]
    PoolTooSmall {
        /// Length of the supplied memory.
        length: usize,
        /// Minimum length of a pool.
        minimum: usize,
    },
    /// The memory supplied for a pool is larger than the largest block the geometry can represent.
    #[error("pool of {length} bytes is too large, at most {maximum} bytes supported")]
    PoolTooLarge {
        /// Length of the supplied memory.
        length: usize,
        /// Maximum length of a pool.
        maximum: usize,
    },
    /// The memory supplied is not sufficiently aligned.
    #[error("memory at {address:#x} is not aligned on {alignment} bytes")]
    MisalignedRegion {
        /// Address of the supplied memory.
        address: usize,
        /// Required alignment.
        alignment: usize,
    },
    /// The pool still contains live allocations.
    #[error("pool still contains live allocations")]
    PoolNotEmpty,
    /// The pool is not registered with this control structure.
    #[error("pool is not registered with this control structure")]
    UnknownPool,
}

impl Error {
    /// Returns whether the error is a configuration error: a geometry, or a region, which cannot be used.
    ///
    /// Configuration errors are terminal for the region at hand, but leave the control structure unaffected.
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self,
            Error::InvalidGeometry { .. } |
            Error::ControlTooSmall { .. } |
            Error::PoolTooSmall { .. } |
            Error::PoolTooLarge { .. } |
            Error::MisalignedRegion { .. })
    }
}

/// RemovePoolError
///
/// Returned when a pool cannot be removed, giving back ownership of the handle.
#[derive(thiserror::Error)]
#[error("cannot remove pool: {error}")]
pub struct RemovePoolError<'a> {
    /// The reason for the failure.
    pub error: Error,
    /// The handle, which remains valid.
    pub pool: PoolHandle<'a>,
}

impl<'a> RemovePoolError<'a> {
    /// Returns the handle, discarding the error.
    pub fn into_pool(self) -> PoolHandle<'a> { self.pool }
}

impl<'a> fmt::Debug for RemovePoolError<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovePoolError").field("error", &self.error).field("pool", &self.pool).finish()
    }
}

/// Violation
///
/// A broken invariant, as reported by `Tlsf::check`.
///
/// Violations are the symptoms of memory corruption, or of misuse of the unsafe API: releasing a block twice,
/// writing past the end of a block, ...
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Violation {
    /// A second-level bit is set whilst the first-level bit of its row is clear.
    #[error("second-level bit ({fl}, {sl}) set, but first-level bit {fl} clear")]
    OrphanSecondLevelBit {
        /// First-level index.
        fl: usize,
        /// Second-level index.
        sl: usize,
    },
    /// A first-level bit is set whilst none of its second-level bits are.
    #[error("first-level bit {fl} set, but its second-level row is empty")]
    EmptyFirstLevelRow {
        /// First-level index.
        fl: usize,
    },
    /// A free list is not empty, yet its bit is clear.
    #[error("free list ({fl}, {sl}) is not empty, but its bit is clear")]
    UnindexedFreeList {
        /// First-level index.
        fl: usize,
        /// Second-level index.
        sl: usize,
    },
    /// A free list is empty, yet its bit is set.
    #[error("free list ({fl}, {sl}) is empty, but its bit is set")]
    EmptyIndexedFreeList {
        /// First-level index.
        fl: usize,
        /// Second-level index.
        sl: usize,
    },
    /// The links of a free list are inconsistent: a block's predecessor does not link to it.
    #[error("free list ({fl}, {sl}) has inconsistent links")]
    BrokenFreeList {
        /// First-level index.
        fl: usize,
        /// Second-level index.
        sl: usize,
    },
    /// A block linked in a free list is not marked free.
    #[error("block at {address:#x} is linked in a free list, but not marked free")]
    UsedBlockInFreeList {
        /// Address of the block header.
        address: usize,
    },
    /// A block is linked in the free list of a class it does not belong to.
    #[error("block at {address:#x} of {size} bytes is linked in the wrong free list ({fl}, {sl})")]
    MisindexedBlock {
        /// Address of the block header.
        address: usize,
        /// Size of the block.
        size: usize,
        /// First-level index of the list.
        fl: usize,
        /// Second-level index of the list.
        sl: usize,
    },
    /// A free block is adjacent to another free block.
    #[error("free block at {address:#x} has not been coalesced with its neighbour")]
    UncoalescedBlock {
        /// Address of the block header.
        address: usize,
    },
    /// A free block is smaller than the minimum block size.
    #[error("free block at {address:#x} of {size} bytes is below the minimum block size")]
    UndersizedBlock {
        /// Address of the block header.
        address: usize,
        /// Size of the block.
        size: usize,
    },
    /// The previous-free bit of a block disagrees with the status of its predecessor.
    #[error("block at {address:#x} disagrees with the status of its predecessor")]
    PreviousStatusMismatch {
        /// Address of the block header.
        address: usize,
    },
    /// The boundary tag of a free block does not point back to it.
    #[error("boundary tag of free block at {address:#x} is corrupted")]
    CorruptedBoundaryTag {
        /// Address of the block header.
        address: usize,
    },
    /// A free block is not linked in the free list of its class.
    #[error("free block at {address:#x} is missing from its free list")]
    UnlistedFreeBlock {
        /// Address of the block header.
        address: usize,
    },
    /// A pool's blocks do not exactly tile the pool.
    #[error("pool at {address:#x} is corrupted: blocks overrun its end or sentinels are damaged")]
    CorruptedPool {
        /// Address of the pool.
        address: usize,
    },
}
