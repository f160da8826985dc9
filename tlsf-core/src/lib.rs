#![no_std]

#![deny(missing_docs)]

//! Building blocks for a bounded-latency allocator.
//!
//! tlsf-core implements the Two-Level Segregated Fit algorithm: allocation, deallocation and in-place resizing all
//! complete in a bounded number of steps, regardless of the number of live allocations or pools. It contains:
//! -   A configuration trait, used to pick the size-class geometry at compile-time.
//! -   The `Tlsf` control structure, carved from caller-supplied memory, which serves allocations out of pools also
//!     supplied by the caller.
//!
//! tlsf-core neither locks nor requests memory from the OS: serializing accesses and sourcing memory are left to the
//! user, see the `tlsf` crate for an example.

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(test)]
extern crate std;

mod api;
mod internals;
mod utils;

pub use api::*;
