use crate::error::StorageError;
use crate::link::{NewPermanentLink, PermanentLink};
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result type for durable store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The durable tier holding permanent links.
///
/// Implementations must enforce uniqueness of the short code themselves:
/// the pre-insert existence check done by callers is only a fast path.
#[async_trait]
pub trait DurableStore: Send + Sync + 'static {
    /// Inserts a new permanent link and returns it with the store-assigned
    /// `id` and `created_at`.
    ///
    /// Returns `Err(StorageError::Conflict)` if the code is already taken.
    async fn insert(&self, link: NewPermanentLink) -> Result<PermanentLink>;

    /// Retrieves the link stored under `code`.
    /// Returns `None` if the code does not exist.
    async fn get(&self, code: &ShortCode) -> Result<Option<PermanentLink>>;

    /// Checks whether a short code exists in the store.
    async fn exists(&self, code: &ShortCode) -> Result<bool>;

    /// Deletes every link created more than `age` ago, measured against the
    /// store's own clock. Returns the number of deleted links.
    ///
    /// Safe to run concurrently with reads and writes.
    async fn prune_older_than(&self, age: Duration) -> Result<u64>;
}

#[async_trait]
impl<T: DurableStore + ?Sized> DurableStore for Arc<T> {
    async fn insert(&self, link: NewPermanentLink) -> Result<PermanentLink> {
        (**self).insert(link).await
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<PermanentLink>> {
        (**self).get(code).await
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        (**self).exists(code).await
    }

    async fn prune_older_than(&self, age: Duration) -> Result<u64> {
        (**self).prune_older_than(age).await
    }
}
