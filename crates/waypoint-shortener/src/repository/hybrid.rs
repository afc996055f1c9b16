use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace, warn};
use waypoint_core::repository::Result;
use waypoint_core::{
    CacheError, DurableStore, Link, LinkCache, NewPermanentLink, PermanentLink, ShortCode,
    StorageError, TemporaryLink,
};

use crate::repository::LinkRepository;

/// TTL of the cache copy of a permanent link, both on save and on repair.
///
/// Pruning only touches the durable tier, so a pruned link keeps resolving
/// from its mirror for up to this long.
pub const MIRROR_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Composes a durable store and a cache into one repository.
///
/// - **Save temporary**: cache tier only, written with an atomic
///   insert-if-absent after checking both tiers.
/// - **Save permanent**: durable tier first, then a best-effort mirror into
///   the cache. The durable store's uniqueness constraint is the final
///   arbiter of collisions.
/// - **Get**: cache-aside. Cache errors are logged and treated as misses;
///   a durable hit repopulates the cache before returning.
///
/// # Type Parameters
///
/// * `S` - The durable tier (e.g., `PostgresStore`)
/// * `C` - The cache tier (e.g., `RedisLinkCache`)
#[derive(Debug, Clone)]
pub struct HybridRepository<S, C> {
    store: S,
    cache: C,
    timeout: Option<Duration>,
}

impl<S, C> HybridRepository<S, C> {
    pub fn new(store: S, cache: C) -> Self {
        Self {
            store,
            cache,
            timeout: None,
        }
    }

    /// Bounds every individual tier call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

async fn bounded<T, E>(
    limit: Option<Duration>,
    fut: impl Future<Output = std::result::Result<T, E>>,
    on_elapsed: impl FnOnce(Duration) -> E,
) -> std::result::Result<T, E> {
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_elapsed(limit)),
        },
    }
}

impl<S, C> HybridRepository<S, C>
where
    S: DurableStore,
    C: LinkCache,
{
    async fn durable<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        bounded(self.timeout, fut, |limit| {
            StorageError::Timeout(format!("durable {operation} exceeded {limit:?}"))
        })
        .await
    }

    async fn cached<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = std::result::Result<T, CacheError>>,
    ) -> std::result::Result<T, CacheError> {
        bounded(self.timeout, fut, |limit| {
            CacheError::Timeout(format!("cache {operation} exceeded {limit:?}"))
        })
        .await
    }

    /// Returns `true` if `code` is taken in either tier.
    ///
    /// Errors from either tier are surfaced so the caller aborts its write.
    pub async fn exists(&self, code: &ShortCode) -> Result<bool> {
        if self.durable("exists", self.store.exists(code)).await? {
            trace!(code = %code, "code exists in durable tier");
            return Ok(true);
        }

        let live = self
            .cached("get", self.cache.get_link(code))
            .await?
            .is_some();
        if live {
            trace!(code = %code, "code exists in cache tier");
        }
        Ok(live)
    }

    async fn mirror(&self, link: &PermanentLink) {
        let entry = Link::Permanent(link.clone());
        if let Err(e) = self.cached("set", self.cache.set_link(&entry, MIRROR_TTL)).await {
            warn!(code = %link.code, error = %e, "Failed to mirror permanent link into cache");
        }
    }
}

#[async_trait]
impl<S, C> LinkRepository for HybridRepository<S, C>
where
    S: DurableStore,
    C: LinkCache,
{
    async fn save_temporary(&self, link: TemporaryLink, ttl: Duration) -> Result<TemporaryLink> {
        if self.exists(&link.code).await? {
            return Err(StorageError::Conflict(link.code.to_string()));
        }

        let entry = Link::Temporary(link.clone());
        let written = self
            .cached("set_if_absent", self.cache.set_link_if_absent(&entry, ttl))
            .await?;
        if !written {
            return Err(StorageError::Conflict(link.code.to_string()));
        }

        debug!(code = %link.code, ttl_secs = ttl.as_secs(), "saved temporary link");
        Ok(link)
    }

    async fn save_permanent(&self, link: NewPermanentLink) -> Result<PermanentLink> {
        if self.exists(&link.code).await? {
            return Err(StorageError::Conflict(link.code.to_string()));
        }

        let saved = self.durable("insert", self.store.insert(link)).await?;
        debug!(code = %saved.code, id = %saved.id, "saved permanent link");

        self.mirror(&saved).await;
        Ok(saved)
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<Link>> {
        match self.cached("get", self.cache.get_link(code)).await {
            Ok(Some(link)) => {
                trace!(code = %code, "served from cache");
                return Ok(Some(link));
            }
            Ok(None) => trace!(code = %code, "cache miss, falling back to durable tier"),
            Err(e) => {
                warn!(code = %code, error = %e, "Cache read failed, falling back to durable tier")
            }
        }

        match self.durable("get", self.store.get(code)).await? {
            Some(link) => {
                self.mirror(&link).await;
                Ok(Some(Link::Permanent(link)))
            }
            None => Ok(None),
        }
    }
}
