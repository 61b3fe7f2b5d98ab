//! Adapters: the mapper's route to a backing store

pub mod http;
pub mod memory;
pub mod traits;

pub use http::{HttpAdapter, ResourceConfig};
pub use memory::{IdStrategy, MemoryAdapter};
pub use traits::{Adapter, FindQuery, Operation};
