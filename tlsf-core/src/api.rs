//! The API of tlsf-core.

pub(crate) mod configuration;
mod error;
pub(crate) mod pool;
mod tlsf;

pub use configuration::{CompactConfiguration, Configuration, DefaultConfiguration, Properties};
pub use error::{Error, RemovePoolError, Violation};
pub use pool::{BlockInfo, PoolHandle};
pub use tlsf::Tlsf;
pub use crate::utils::PowerOf2;
