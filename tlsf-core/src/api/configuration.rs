//! The configuration of tlsf-core.
//!
//! The size-class geometry is a trade-off between the footprint of the control structure and the internal
//! fragmentation:
//!
//! -   The first level splits sizes by powers of 2, up to `1 << FIRST_LEVEL_MAX`, the largest block size.
//! -   The second level linearly subdivides each power of 2 into `1 << SECOND_LEVEL_LOG2` classes, bounding the
//!     internal fragmentation caused by rounding a request up to its class to `1 / (1 << SECOND_LEVEL_LOG2)`.
//!
//! Each (first-level, second-level) pair costs a word in the control structure, hence constrained systems managing
//! small pools benefit from a smaller geometry.

use core::{marker, mem};

use super::Error;
use crate::PowerOf2;
use crate::internals::size_class::Geometry;

/// Configuration
///
/// The Configuration instance selects the size-class geometry.
pub trait Configuration {
    /// The base-2 logarithm of the number of second-level classes per first-level class.
    ///
    /// Valid values range from 1 to 5, inclusive; 4 or 5 are typical.
    const SECOND_LEVEL_LOG2: u32;

    /// The base-2 logarithm of the largest block size.
    ///
    /// Valid values range from `SECOND_LEVEL_LOG2 + log2(size_of::<usize>()) + 1` to `usize::BITS - 1`, inclusive.
    const FIRST_LEVEL_MAX: u32;
}

/// The default geometry: 32 second-level classes, blocks of up to 4 GB (1 GB on 32-bits targets).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfiguration;

impl Configuration for DefaultConfiguration {
    const SECOND_LEVEL_LOG2: u32 = 5;

    #[cfg(target_pointer_width = "64")]
    const FIRST_LEVEL_MAX: u32 = 32;

    #[cfg(not(target_pointer_width = "64"))]
    const FIRST_LEVEL_MAX: u32 = 30;
}

/// A compact geometry, for constrained systems: 16 second-level classes, blocks of up to 64 KB.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompactConfiguration;

impl Configuration for CompactConfiguration {
    const SECOND_LEVEL_LOG2: u32 = 4;
    const FIRST_LEVEL_MAX: u32 = 16;
}

/// Properties
///
/// Properties of a given Configuration.
///
/// Work-around for the inability to implement static methods directly on a trait.
pub struct Properties<C>(marker::PhantomData<C>);

impl<C> Properties<C>
    where
        C: Configuration
{
    /// Returns whether the geometry is within the supported range.
    pub fn validate() -> Result<(), Error> { Self::geometry().map(|_| ()) }

    /// Returns the granularity of sizes and addresses.
    pub fn align_size() -> usize { ALIGN_SIZE }

    /// Returns the number of first-level classes, or 0 if the geometry is invalid.
    pub fn first_level_count() -> usize { Self::geometry().map(|g| g.first_level_count()).unwrap_or(0) }

    /// Returns the number of second-level classes per first-level class.
    pub fn second_level_count() -> usize { 1 << C::SECOND_LEVEL_LOG2 }

    /// Returns the size below which the second-level classes are linear across the whole range, rather than
    /// subdividing a power of 2.
    pub fn small_block_size() -> usize { 1 << (C::SECOND_LEVEL_LOG2 + ALIGN_SIZE.trailing_zeros()) }

    /// Returns the minimum size of a block.
    ///
    /// A free block stores 2 links and its boundary tag within its payload.
    pub fn block_size_min() -> usize { BLOCK_SIZE_MIN }

    /// Returns the size of the largest block, exclusive.
    ///
    /// Requests for that many bytes, or more, cannot be fulfilled.
    pub fn block_size_max() -> usize { 1usize.checked_shl(C::FIRST_LEVEL_MAX).unwrap_or(0) }

    /// Returns the number of bytes of overhead of a single allocation.
    pub fn allocation_overhead() -> usize { ALLOCATION_OVERHEAD }

    /// Returns the number of bytes of overhead of a single pool.
    pub fn pool_overhead() -> usize { POOL_OVERHEAD }

    /// Returns the minimum length of a pool.
    ///
    /// The memory supplied to `Tlsf::add_pool` must also be aligned on `align_size()`.
    pub fn minimum_pool_size() -> usize { POOL_OVERHEAD + BLOCK_SIZE_MIN }

    /// Returns the maximum length of a pool.
    ///
    /// The interior block of the pool must be strictly smaller than `block_size_max()`.
    pub fn maximum_pool_size() -> usize {
        POOL_OVERHEAD.saturating_add(Self::block_size_max().saturating_sub(ALIGN_SIZE))
    }

    /// Returns the minimum length of a pool able to serve a request of `size` bytes aligned on `alignment`, once
    /// added to an instance without any other free block.
    ///
    /// Returns None if no pool can serve the request, for example when the alignment is too large.
    pub fn pool_size_for(size: usize, alignment: PowerOf2) -> Option<usize> {
        let block = Self::geometry().ok()?.block_size_for(size, alignment)?;
        let length = POOL_OVERHEAD.checked_add(block)?;

        if length > Self::maximum_pool_size() {
            return None;
        }

        Some(length)
    }

    /// Returns the number of bytes required by the control structure, or 0 if the geometry is invalid.
    ///
    /// The memory supplied to `Tlsf::new` must be aligned on `align_size()`.
    pub fn control_size() -> usize { Self::geometry().map(|g| g.control_size()).unwrap_or(0) }

    pub(crate) fn geometry() -> Result<Geometry, Error> {
        Geometry::new(C::SECOND_LEVEL_LOG2, C::FIRST_LEVEL_MAX)
            .ok_or(Error::InvalidGeometry {
                second_level_log2: C::SECOND_LEVEL_LOG2,
                first_level_max: C::FIRST_LEVEL_MAX,
            })
    }
}

//
//  Implementation Details.
//

//  All sizes and addresses are aligned on a word, leaving the 2 low bits of the size free for the status bits.
pub(crate) const ALIGN_SIZE: usize = mem::size_of::<usize>();

//  A used block only carries its size, a free block also carries 2 links and its boundary tag.
pub(crate) const ALLOCATION_OVERHEAD: usize = ALIGN_SIZE;
pub(crate) const BLOCK_SIZE_MIN: usize = 3 * ALIGN_SIZE;

//  Pool record (4 words), start sentinel, interior block header and end sentinel.
pub(crate) const POOL_OVERHEAD: usize = 7 * ALIGN_SIZE;

//  The leading gap of an over-aligned block must be large enough to form a free block.
pub(crate) const GAP_MINIMUM: usize = ALIGN_SIZE + BLOCK_SIZE_MIN;

#[cfg(test)]
mod tests {

use super::*;

struct TinyConfiguration;

impl Configuration for TinyConfiguration {
    const SECOND_LEVEL_LOG2: u32 = 2;
    const FIRST_LEVEL_MAX: u32 = 10;
}

struct WideConfiguration;

impl Configuration for WideConfiguration {
    const SECOND_LEVEL_LOG2: u32 = 6;
    const FIRST_LEVEL_MAX: u32 = 32;
}

struct ShallowConfiguration;

impl Configuration for ShallowConfiguration {
    const SECOND_LEVEL_LOG2: u32 = 5;
    const FIRST_LEVEL_MAX: u32 = 5;
}

#[test]
fn assumptions() {
    assert!(ALIGN_SIZE >= 4);
    assert_eq!(1, ALIGN_SIZE.count_ones());
    assert_eq!(0, BLOCK_SIZE_MIN % ALIGN_SIZE);
}

#[test]
fn properties_validate() {
    assert_eq!(Ok(()), Properties::<DefaultConfiguration>::validate());
    assert_eq!(Ok(()), Properties::<CompactConfiguration>::validate());
    assert_eq!(Ok(()), Properties::<TinyConfiguration>::validate());

    assert_eq!(
        Err(Error::InvalidGeometry { second_level_log2: 6, first_level_max: 32 }),
        Properties::<WideConfiguration>::validate()
    );
    assert_eq!(
        Err(Error::InvalidGeometry { second_level_log2: 5, first_level_max: 5 }),
        Properties::<ShallowConfiguration>::validate()
    );
}

#[test]
fn properties_default() {
    type P = Properties<DefaultConfiguration>;

    assert_eq!(32, P::second_level_count());
    assert_eq!(32 * ALIGN_SIZE, P::small_block_size());
    assert_eq!(BLOCK_SIZE_MIN, P::block_size_min());
    assert_eq!(ALIGN_SIZE, P::allocation_overhead());

    #[cfg(target_pointer_width = "64")]
    {
        //  Shift of 8: classes 2^8 to 2^32.
        assert_eq!(25, P::first_level_count());
        assert_eq!(1 << 32, P::block_size_max());
    }
}

#[test]
fn properties_compact() {
    type P = Properties<CompactConfiguration>;

    assert_eq!(16, P::second_level_count());
    assert_eq!(1 << 16, P::block_size_max());
    assert_eq!(POOL_OVERHEAD + (1 << 16) - ALIGN_SIZE, P::maximum_pool_size());
    assert_eq!(POOL_OVERHEAD + BLOCK_SIZE_MIN, P::minimum_pool_size());

    //  The compact control structure is smaller than the default one.
    assert!(P::control_size() < Properties::<DefaultConfiguration>::control_size());
}

#[test]
fn properties_pool_size_for() {
    type P = Properties<CompactConfiguration>;

    let word = PowerOf2::align_of::<usize>();
    let half = P::block_size_max() / 2;

    assert_eq!(None, P::pool_size_for(0, word));
    assert_eq!(Some(POOL_OVERHEAD + BLOCK_SIZE_MIN), P::pool_size_for(1, word));

    //  A power of 2 is the first size of its class.
    assert_eq!(Some(POOL_OVERHEAD + half), P::pool_size_for(half, word));

    //  Either the class, or the alignment, rounds the search up to `block_size_max()`.
    assert_eq!(None, P::pool_size_for(P::block_size_max() - ALIGN_SIZE, word));
    assert_eq!(None, P::pool_size_for(8, PowerOf2::new(half).expect("Power of 2")));

    let aligned = P::pool_size_for(100, PowerOf2::new(256).expect("Power of 2")).expect("Servable");
    assert!(aligned >= POOL_OVERHEAD + 100 + 256);
    assert!(aligned <= P::maximum_pool_size());
}

#[test]
fn properties_control_size() {
    type P = Properties<TinyConfiguration>;

    let first = P::first_level_count();
    let second = P::second_level_count();

    //  Null block, heads, then second-level bitmaps rounded up to a word.
    let expected = 3 * ALIGN_SIZE + first * second * ALIGN_SIZE + (first * 4 + ALIGN_SIZE - 1) / ALIGN_SIZE * ALIGN_SIZE;

    assert_eq!(expected, P::control_size());
    assert_eq!(0, Properties::<WideConfiguration>::control_size());
}

}
