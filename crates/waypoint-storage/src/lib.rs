//! Durable store adapters for permanent links.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use waypoint_core::repository::{DurableStore, Result};
pub use waypoint_core::StorageError;
