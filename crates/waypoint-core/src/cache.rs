use crate::error::CacheError;
use crate::link::Link;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// The cache tier for temporary links and mirrors of permanent links.
///
/// Entries are keyed by [`ShortCode`]; implementations namespace their keys
/// so they can share a backend with other consumers.
#[async_trait]
pub trait LinkCache: Send + Sync + 'static {
    /// Get a live link from the cache.
    ///
    /// Returns `Ok(None)` if the key is absent or has expired.
    async fn get_link(&self, code: &ShortCode) -> Result<Option<Link>>;

    /// Store a link with the given TTL, overwriting any existing entry.
    async fn set_link(&self, link: &Link, ttl: Duration) -> Result<()>;

    /// Store a link only if no live entry exists for its code.
    ///
    /// Returns `true` if this call wrote the entry. The check and the write
    /// are a single atomic operation on the backend.
    async fn set_link_if_absent(&self, link: &Link, ttl: Duration) -> Result<bool>;
}

#[async_trait]
impl<T: LinkCache + ?Sized> LinkCache for Arc<T> {
    async fn get_link(&self, code: &ShortCode) -> Result<Option<Link>> {
        (**self).get_link(code).await
    }

    async fn set_link(&self, link: &Link, ttl: Duration) -> Result<()> {
        (**self).set_link(link, ttl).await
    }

    async fn set_link_if_absent(&self, link: &Link, ttl: Duration) -> Result<bool> {
        (**self).set_link_if_absent(link, ttl).await
    }
}
