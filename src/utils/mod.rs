//! Storage backends and caller-side helpers

pub mod memory_storage;
#[cfg(feature = "postgres")]
pub mod postgres_storage;
pub mod validation;

pub use memory_storage::*;
#[cfg(feature = "postgres")]
pub use postgres_storage::*;
pub use validation::*;
