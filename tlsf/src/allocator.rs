//! Allocator

use core::{
    alloc::{GlobalAlloc, Layout},
    cmp,
    mem::MaybeUninit,
    ptr::{self, NonNull},
    slice,
};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use tlsf_core::{DefaultConfiguration, PoolHandle, PowerOf2, Properties, Tlsf};

use crate::{Platform, RegionConfiguration, TlsfConfiguration, TlsfPlatform};

/// Bounded-Latency Allocator.
///
/// All instances share a single heap.
#[derive(Default)]
pub struct TlsfAllocator;

impl TlsfAllocator {
    /// Creates an instance.
    pub const fn new() -> Self { Self }

    /// Prepares the heap for allocation: maps the control structure, and a first pool.
    ///
    /// Returns Ok if the attempt succeeded, Err otherwise.
    ///
    /// Failure to warm up may occur if the underlying `Platform` cannot map the memory.
    #[cold]
    pub fn warm_up(&self) -> Result<(), ()> {
        let mut heap = HEAP.lock();

        if heap.number_pools() > 0 {
            return Ok(());
        }

        heap.grow(0).map(|_| ()).ok_or(())
    }

    /// Ensures that at least `target` bytes of pools are mapped.
    ///
    /// Returns the number of bytes of pools mapped, which may fall short of `target` if the underlying `Platform`
    /// fails to map more memory, or the maximum number of pools is reached.
    #[cold]
    pub fn reserve(&self, target: usize) -> usize {
        let mut heap = HEAP.lock();

        while heap.reserved < target {
            let missing = target - heap.reserved;
            let request = cmp::min(missing, Properties::<DefaultConfiguration>::maximum_pool_size());

            if heap.grow(request).is_none() {
                break;
            }
        }

        heap.reserved
    }

    /// Allocates `layout.size()` bytes of memory, aligned on at least `layout.align()`.
    ///
    /// Returns None if `layout.size()` is 0, or if no memory can be obtained.
    pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let alignment = PowerOf2::new(layout.align())?;

        HEAP.lock().allocate(layout.size(), alignment)
    }

    /// Deallocates the memory located at `pointer`.
    ///
    /// #   Safety
    ///
    /// -   Assumes `pointer` has been returned by a prior call to `allocate` or `reallocate`.
    /// -   Assumes `pointer` has not been deallocated since its allocation.
    /// -   Assumes the memory pointed by `pointer` is no longer in use.
    pub unsafe fn deallocate(&self, pointer: NonNull<u8>) {
        HEAP.lock().deallocate(pointer)
    }

    /// Reallocates the memory located at `pointer` to `new_size` bytes, preserving the alignment of `layout`.
    ///
    /// On success, the memory at `pointer` must no longer be used, and the result is used instead. On failure, the
    /// memory at `pointer` is untouched.
    ///
    /// #   Safety
    ///
    /// -   Assumes `pointer` has been returned by a prior call to `allocate` or `reallocate`, with `layout`.
    /// -   Assumes `pointer` has not been deallocated since its allocation.
    /// -   Assumes `new_size` is not 0.
    pub unsafe fn reallocate(&self, pointer: NonNull<u8>, layout: Layout, new_size: usize) -> Option<NonNull<u8>> {
        debug_assert!(new_size != 0);

        let alignment = PowerOf2::new(layout.align())?;

        HEAP.lock().reallocate(pointer, new_size, alignment)
    }

    /// Returns the usable size of the memory located at `pointer`, at least the size requested.
    ///
    /// #   Safety
    ///
    /// -   Assumes `pointer` has been returned by a prior call to `allocate` or `reallocate`.
    /// -   Assumes `pointer` has not been deallocated since its allocation.
    pub unsafe fn block_size(&self, pointer: NonNull<u8>) -> usize {
        HEAP.lock().tlsf.as_ref().map(|tlsf| tlsf.block_size(pointer)).unwrap_or(0)
    }

    /// Checks the integrity of the heap, returning the number of violations found.
    ///
    /// Linear in the number of blocks, meant for diagnostics.
    #[cold]
    pub fn check(&self) -> usize {
        HEAP.lock().tlsf.as_ref().map(|tlsf| tlsf.check_with(|_| ())).unwrap_or(0)
    }

    /// Returns the empty pools to the OS.
    ///
    /// Returns the number of pools returned.
    #[cold]
    pub fn trim(&self) -> usize { HEAP.lock().trim() }
}

unsafe impl GlobalAlloc for TlsfAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocate(layout).map(|ptr| ptr.as_ptr()).unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            self.deallocate(ptr);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        match NonNull::new(ptr) {
            Some(ptr) => self.reallocate(ptr, layout, new_size).map(|ptr| ptr.as_ptr()).unwrap_or(ptr::null_mut()),
            None => self.alloc(Layout::from_size_align_unchecked(new_size, layout.align())),
        }
    }
}

//
//  Integration test backdoors.
//
//  Unfortunately the backdoors have to be exposed as part of the public API for use in integration tests.
//

impl TlsfAllocator {
    /// Exposes the number of pools.
    #[cold]
    #[doc(hidden)]
    pub fn number_pools(&self) -> usize { HEAP.lock().number_pools() }
}

//
//  Implementation
//

type Heap = spin::Mutex<HeapState>;

static HEAP: Heap = spin::Mutex::new(HeapState::new());

static PLATFORM: TlsfPlatform = TlsfPlatform::new();

const NO_POOL: Option<PoolHandle<'static>> = None;

struct HeapState {
    tlsf: Option<Tlsf<'static, DefaultConfiguration>>,
    pools: [Option<PoolHandle<'static>>; TlsfConfiguration::MAXIMUM_POOLS],
    reserved: usize,
}

impl HeapState {
    const fn new() -> Self {
        Self { tlsf: None, pools: [NO_POOL; TlsfConfiguration::MAXIMUM_POOLS], reserved: 0 }
    }

    fn number_pools(&self) -> usize { self.tlsf.as_ref().map(|tlsf| tlsf.number_pools()).unwrap_or(0) }

    //  Allocates, mapping a new pool and retrying once on exhaustion.
    fn allocate(&mut self, size: usize, alignment: PowerOf2) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }

        if let Some(result) = self.tlsf.as_mut().and_then(|tlsf| tlsf.allocate_aligned(size, alignment)) {
            return Some(result);
        }

        let slot = self.grow_for(size, alignment)?;
        let result = self.tlsf.as_mut()?.allocate_aligned(size, alignment);

        if result.is_none() {
            self.shrink(slot);
        }

        result
    }

    //  #   Safety
    //
    //  -   Assumes `pointer` was allocated by this heap, and not deallocated since.
    unsafe fn deallocate(&mut self, pointer: NonNull<u8>) {
        debug_assert!(self.tlsf.is_some(), "Deallocating {:x} before any allocation", pointer.as_ptr() as usize);

        if let Some(tlsf) = self.tlsf.as_mut() {
            tlsf.release(pointer);
        }
    }

    //  #   Safety
    //
    //  -   Assumes `pointer` was allocated by this heap, aligned on `alignment`, and not deallocated since.
    unsafe fn reallocate(&mut self, pointer: NonNull<u8>, size: usize, alignment: PowerOf2) -> Option<NonNull<u8>> {
        if let Some(result) = self.tlsf.as_mut()?.resize_aligned(pointer, size, alignment) {
            return Some(result);
        }

        let slot = self.grow_for(size, alignment)?;
        let result = self.tlsf.as_mut()?.resize_aligned(pointer, size, alignment);

        if result.is_none() {
            self.shrink(slot);
        }

        result
    }

    //  Maps a pool able to serve a request of `size` bytes aligned on `alignment`, on its own.
    //
    //  Nothing is mapped if no pool can ever serve the request.
    #[cold]
    fn grow_for(&mut self, size: usize, alignment: PowerOf2) -> Option<usize> {
        let length = Properties::<DefaultConfiguration>::pool_size_for(size, alignment);

        #[cfg(feature = "tracing")]
        if length.is_none() {
            debug!(size, alignment = alignment.value(), "request cannot be served by any pool");
        }

        self.grow(length?)
    }

    //  Maps a pool of at least `minimum` bytes, creating the control structure first if need be.
    //
    //  Returns the slot of the pool, if one was added.
    #[cold]
    #[inline(never)]
    fn grow(&mut self, minimum: usize) -> Option<usize> {
        const PAGE_SIZE: PowerOf2 = TlsfConfiguration::PAGE_SIZE;

        let maximum = Properties::<DefaultConfiguration>::maximum_pool_size();

        if self.tlsf.is_none() && !self.initialize() {
            return None;
        }

        let slot = match self.pools.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                #[cfg(feature = "tracing")]
                warn!(maximum = TlsfConfiguration::MAXIMUM_POOLS, "no pool slot left");

                return None;
            },
        };

        let length = match PAGE_SIZE.round_up(cmp::max(minimum, TlsfConfiguration::REGION_SIZE.value())) {
            Some(length) if length <= maximum => length,
            _ if PAGE_SIZE.round_down(maximum) >= minimum => PAGE_SIZE.round_down(maximum),
            _ => return None,
        };

        let tlsf = self.tlsf.as_mut()?;
        let memory = map(length)?;

        let start = memory.as_mut_ptr();

        match tlsf.add_pool(memory) {
            Ok(pool) => {
                #[cfg(feature = "tracing")]
                debug!(length, slot, "pool mapped");

                self.pools[slot] = Some(pool);
                self.reserved += length;

                Some(slot)
            },
            Err(_error) => {
                #[cfg(feature = "tracing")]
                warn!(%_error, length, "pool rejected");

                //  Safety:
                //  -   The region was mapped above, and rejected.
                unsafe { unmap(start, length) };

                None
            },
        }
    }

    //  Maps the control structure.
    #[cold]
    fn initialize(&mut self) -> bool {
        const PAGE_SIZE: PowerOf2 = TlsfConfiguration::PAGE_SIZE;

        let length = match PAGE_SIZE.round_up(Properties::<DefaultConfiguration>::control_size()) {
            Some(length) => length,
            None => return false,
        };

        let memory = match map(length) {
            Some(memory) => memory,
            None => return false,
        };

        let start = memory.as_mut_ptr();

        match Tlsf::new(memory) {
            Ok(tlsf) => {
                self.tlsf = Some(tlsf);
                true
            },
            Err(_error) => {
                #[cfg(feature = "tracing")]
                warn!(%_error, "control structure rejected");

                //  Safety:
                //  -   The region was mapped above, and rejected.
                unsafe { unmap(start, length) };

                false
            },
        }
    }

    //  Removes and unmaps the empty pools.
    #[cold]
    fn trim(&mut self) -> usize {
        let released = (0..self.pools.len()).filter(|&slot| self.shrink(slot)).count();

        #[cfg(feature = "tracing")]
        debug!(released, remaining = self.number_pools(), "pools trimmed");

        released
    }

    //  Removes and unmaps the pool of `slot`, if empty.
    //
    //  Returns whether the pool was unmapped.
    fn shrink(&mut self, slot: usize) -> bool {
        let (tlsf, pool) = match (self.tlsf.as_mut(), self.pools[slot].take()) {
            (Some(tlsf), Some(pool)) => (tlsf, pool),
            (_, pool) => {
                self.pools[slot] = pool;
                return false;
            },
        };

        match tlsf.remove_pool(pool) {
            Ok(memory) => {
                let length = memory.len();

                //  Safety:
                //  -   The region was mapped by `grow`, and is no longer registered.
                unsafe { unmap(memory.as_mut_ptr(), length) };

                self.reserved -= length;

                true
            },
            Err(error) => {
                self.pools[slot] = Some(error.into_pool());
                false
            },
        }
    }
}

//  Maps `length` bytes, a multiple of the page size, from the platform.
fn map(length: usize) -> Option<&'static mut [MaybeUninit<u8>]> {
    let layout = Layout::from_size_align(length, TlsfConfiguration::PAGE_SIZE.value()).ok()?;

    //  Safety:
    //  -   `length` is a multiple of the page size, by construction.
    let pointer = unsafe { PLATFORM.allocate(layout) };

    if pointer.is_null() {
        return None;
    }

    //  Safety:
    //  -   `pointer` points to `length` bytes, exclusively owned until unmapped.
    Some(unsafe { slice::from_raw_parts_mut(pointer as *mut MaybeUninit<u8>, length) })
}

//  #   Safety
//
//  -   Assumes `pointer` and `length` were passed to, and returned by, `map`.
//  -   Assumes the memory is no longer in use.
unsafe fn unmap(pointer: *mut MaybeUninit<u8>, length: usize) {
    let layout = Layout::from_size_align_unchecked(length, TlsfConfiguration::PAGE_SIZE.value());

    PLATFORM.deallocate(pointer as *mut u8, layout);
}
