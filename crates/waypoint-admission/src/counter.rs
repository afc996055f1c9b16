pub mod memory;
pub mod redis;

pub use memory::MemoryWindowCounter;
pub use redis::RedisWindowCounter;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CounterError;

/// A shared store of expiring counters.
#[async_trait]
pub trait WindowCounter: Send + Sync + 'static {
    /// Increments each key by one and returns the new counts in key order.
    ///
    /// A key created by this call expires after `expiry`; later increments
    /// leave its expiry untouched.
    async fn increment(&self, keys: &[String], expiry: Duration) -> Result<Vec<u64>, CounterError>;
}

#[async_trait]
impl<W: WindowCounter + ?Sized> WindowCounter for Box<W> {
    async fn increment(&self, keys: &[String], expiry: Duration) -> Result<Vec<u64>, CounterError> {
        (**self).increment(keys, expiry).await
    }
}

#[async_trait]
impl<W: WindowCounter + ?Sized> WindowCounter for std::sync::Arc<W> {
    async fn increment(&self, keys: &[String], expiry: Duration) -> Result<Vec<u64>, CounterError> {
        (**self).increment(keys, expiry).await
    }
}
