#![no_std]
#![deny(missing_docs)]

//! A bounded-latency global allocator.
//!
//! The type `TlsfAllocator` serves allocations from a single `tlsf_core::Tlsf` heap, behind a spin lock, whose pools
//! are mapped from the OS on demand.
//!
//! #   Warning
//!
//! Allocation and deallocation take a bounded number of steps once the heap is warm, yet mapping a new pool is a
//! system call: call `warm_up` and `reserve` ahead of time to keep them off the critical path.

mod allocator;
mod platform;

pub use allocator::TlsfAllocator;

use platform::{Platform, RegionConfiguration, TlsfConfiguration, TlsfPlatform};
