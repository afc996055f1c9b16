pub mod hybrid;

pub use hybrid::HybridRepository;

use async_trait::async_trait;
use std::time::Duration;
use waypoint_core::repository::Result;
use waypoint_core::{Link, NewPermanentLink, PermanentLink, ShortCode, TemporaryLink};

/// The read/write surface the link service works against.
///
/// Save operations return `Err(StorageError::Conflict)` when the code is
/// already taken, which callers treat as a retryable collision.
#[async_trait]
pub trait LinkRepository: Send + Sync + 'static {
    /// Stores a link that lives only for `ttl`.
    async fn save_temporary(&self, link: TemporaryLink, ttl: Duration) -> Result<TemporaryLink>;

    /// Stores an owned link and returns it with its assigned `id` and
    /// `created_at`.
    async fn save_permanent(&self, link: NewPermanentLink) -> Result<PermanentLink>;

    /// Returns `None` if no live link exists for `code`.
    async fn get(&self, code: &ShortCode) -> Result<Option<Link>>;
}
