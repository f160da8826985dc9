//! The internals of tlsf-core.
//!
//! The internals provide all the heavy-lifting.

pub mod bitmap;
pub mod block;
pub mod check;
pub mod control;
pub mod free_lists;
pub mod pool;
pub mod region;
pub mod size_class;
