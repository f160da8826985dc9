//! Abstraction over OS differences.

mod api;

pub(crate) use api::{Platform, RegionConfiguration};

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub(crate) use linux::{TlsfConfiguration, TlsfPlatform};
