//! Tlsf
//!
//! An instance of Tlsf is an independent allocator, whose control structure and pools are carved from memory
//! supplied by the user.
//!
//! -   The control structure is created once, from `Properties::<C>::control_size()` bytes of memory.
//! -   Pools are then added, and removed once all their blocks have been released.
//!
//! Tlsf performs no locking: all mutating operations take `&mut self`, and sharing an instance across threads
//! requires an external lock.

use core::{fmt, marker::PhantomData, mem::MaybeUninit, ptr::NonNull};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use super::{BlockInfo, Configuration, DefaultConfiguration, Error, PoolHandle, Properties, RemovePoolError, Violation};
use crate::PowerOf2;
use crate::internals::{control::Control, region::Region};

/// Tlsf
///
/// A bounded-latency allocator, serving blocks out of user-supplied pools.
///
/// #   Example
///
/// ```
/// use core::mem::MaybeUninit;
///
/// use tlsf_core::{DefaultConfiguration, Tlsf};
///
/// #[repr(align(16))]
/// struct Memory([MaybeUninit<u8>; 1 << 16]);
///
/// let mut memory = Box::new(Memory([MaybeUninit::uninit(); 1 << 16]));
///
/// let (mut tlsf, pool) = Tlsf::<DefaultConfiguration>::with_pool(&mut memory.0).expect("Large enough");
///
/// let ptr = tlsf.allocate(100).expect("Allocated");
/// assert!(unsafe { tlsf.block_size(ptr) } >= 100);
///
/// unsafe { tlsf.release(ptr) };
///
/// tlsf.remove_pool(pool).expect("Empty pool");
/// tlsf.destroy().expect("No pool left");
/// ```
pub struct Tlsf<'a, C = DefaultConfiguration> {
    control: Control<'a>,
    memory: Region,
    _configuration: PhantomData<C>,
}

impl<'a, C> Tlsf<'a, C>
    where
        C: Configuration
{
    /// Creates an instance, carving the control structure out of `memory`, without any pool.
    ///
    /// `memory` must be aligned on `Properties::<C>::align_size()`, and at least `Properties::<C>::control_size()`
    /// bytes; any excess is unused.
    pub fn new(memory: &'a mut [MaybeUninit<u8>]) -> Result<Self, Error> {
        let geometry = Properties::<C>::geometry()?;
        let region = Region::from_slice(memory);

        let alignment = Properties::<C>::align_size();

        if region.address() % alignment != 0 {
            return Err(Error::MisalignedRegion { address: region.address(), alignment });
        }

        let required = geometry.control_size();

        if region.length() < required {
            return Err(Error::ControlTooSmall { length: region.length(), required });
        }

        //  Safety:
        //  -   `memory` is aligned, and sufficiently large, as checked above.
        let control = unsafe { Control::initialize(memory, geometry) };

        Ok(Self { control, memory: region, _configuration: PhantomData })
    }

    /// Creates an instance, carving the control structure out of the front of `memory`, and turning the rest into a
    /// pool.
    pub fn with_pool(memory: &'a mut [MaybeUninit<u8>]) -> Result<(Self, PoolHandle<'a>), Error> {
        let required = Properties::<C>::geometry()?.control_size();

        if memory.len() < required {
            return Err(Error::ControlTooSmall { length: memory.len(), required });
        }

        let (control, pool) = memory.split_at_mut(required);

        let mut result = Self::new(control)?;
        let pool = result.add_pool(pool)?;

        Ok((result, pool))
    }

    /// Destroys the instance, returning the memory of the control structure.
    ///
    /// Fails, returning the instance, if any pool is still registered.
    pub fn destroy(self) -> Result<&'a mut [MaybeUninit<u8>], Self> {
        if self.number_pools() != 0 {
            return Err(self);
        }

        //  Safety:
        //  -   `self.memory` was created from a slice of lifetime `'a`, to which no reference remains.
        Ok(unsafe { self.memory.into_slice() })
    }

    /// Registers `memory` as a new pool.
    ///
    /// `memory` must be aligned on `Properties::<C>::align_size()`, and its length must be within
    /// `Properties::<C>::minimum_pool_size()` and `Properties::<C>::maximum_pool_size()`.
    pub fn add_pool(&mut self, memory: &'a mut [MaybeUninit<u8>]) -> Result<PoolHandle<'a>, Error> {
        //  Safety:
        //  -   `memory` is borrowed for `'a`, and handed back only on removal.
        let pool = unsafe { self.control.add_pool(memory)? };

        Ok(PoolHandle::new(pool))
    }

    /// Unregisters a pool, returning its memory.
    ///
    /// Fails, returning the handle, if the pool is not registered with this instance, or still has live allocations.
    pub fn remove_pool(&mut self, pool: PoolHandle<'a>) -> Result<&'a mut [MaybeUninit<u8>], RemovePoolError<'a>> {
        //  Safety:
        //  -   `pool` was returned by `add_pool`, and is consumed by a successful removal.
        match unsafe { self.control.remove_pool(pool.pool()) } {
            //  Safety:
            //  -   The region was created from a slice of lifetime `'a`, whose handle is consumed.
            Ok(region) => Ok(unsafe { region.into_slice() }),
            Err(error) => Err(RemovePoolError { error, pool }),
        }
    }

    /// Returns the number of pools registered.
    pub fn number_pools(&self) -> usize { self.control.pools().len() }

    /// Allocates a block of at least `size` bytes, aligned on `Properties::<C>::align_size()`.
    ///
    /// Returns None if `size` is 0, if `size` is not below `Properties::<C>::block_size_max()`, or if no block is
    /// available, in which case a pool may be added before retrying.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> { self.control.allocate(size) }

    /// Allocates a block of at least `size` bytes, aligned on `alignment`.
    ///
    /// Returns None under the same conditions as `allocate`.
    pub fn allocate_aligned(&mut self, size: usize, alignment: PowerOf2) -> Option<NonNull<u8>> {
        self.control.allocate_aligned(size, alignment)
    }

    /// Releases a block.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned`, `resize` or `resize_aligned` on this
    ///     instance, and has not been released since.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>) { self.control.release(ptr) }

    /// Resizes a block to at least `size` bytes.
    ///
    /// If possible, the block is resized in place. Otherwise, a new block is allocated, the content copied, and the
    /// old block released.
    ///
    /// If `size` is 0, the block is released and None is returned. Otherwise, if None is returned, the block is
    /// untouched.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned`, `resize` or `resize_aligned` on this
    ///     instance, and has not been released since.
    pub unsafe fn resize(&mut self, ptr: NonNull<u8>, size: usize) -> Option<NonNull<u8>> {
        self.resize_aligned(ptr, size, PowerOf2::align_of::<usize>())
    }

    /// Resizes a block to at least `size` bytes, preserving its alignment.
    ///
    /// See `resize`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned`, `resize` or `resize_aligned` on this
    ///     instance, and has not been released since.
    /// -   Assumes that `ptr` is aligned on `alignment`.
    pub unsafe fn resize_aligned(&mut self, ptr: NonNull<u8>, size: usize, alignment: PowerOf2)
        -> Option<NonNull<u8>>
    {
        self.control.resize(ptr, size, alignment)
    }

    /// Returns the usable size of a block, at least the size requested.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was returned by `allocate`, `allocate_aligned`, `resize` or `resize_aligned` on this
    ///     instance, and has not been released since.
    pub unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize { self.control.block_size(ptr) }

    /// Checks the invariants of the instance, calling `fun` for each violation found.
    ///
    /// Returns the number of violations. The check is linear in the number of blocks.
    pub fn check_with<F>(&self, fun: F) -> usize
        where
            F: FnMut(Violation),
    {
        self.control.check_with(fun)
    }

    /// Checks the invariants of the instance, returning the violations found.
    #[cfg(feature = "alloc")]
    pub fn check(&self) -> Vec<Violation> {
        let mut result = Vec::new();
        self.check_with(|violation| result.push(violation));

        result
    }

    /// Calls `fun` for each block of the pool, in address order.
    ///
    /// Fails if the pool is not registered with this instance.
    pub fn walk_pool<F>(&self, pool: &PoolHandle<'a>, mut fun: F) -> Result<(), Error>
        where
            F: FnMut(BlockInfo),
    {
        let pool = pool.pool();

        if pool.owner() != self.control.owner() {
            return Err(Error::UnknownPool);
        }

        //  Safety:
        //  -   The pool is registered with this instance.
        unsafe {
            pool.for_each_block(|block| fun(BlockInfo { pointer: block.payload(), size: block.size(), used: !block.is_free() }));
        }

        Ok(())
    }
}

impl<'a, C> fmt::Debug for Tlsf<'a, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tlsf")
            .field("control", &self.memory.start())
            .field("pools", &self.control.pools().len())
            .finish()
    }
}

//  Safety:
//  -   The instance logically owns its control structure and pools, which may be sent across threads.
unsafe impl<'a, C> Send for Tlsf<'a, C> {}

// mod tests
