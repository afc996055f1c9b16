use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::Expiry;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;
use waypoint_core::cache::Result;
use waypoint_core::{Link, LinkCache, ShortCode};

#[derive(Debug, Clone, TypedBuilder)]
pub struct MokaCacheConfig {
    /// Maximum number of entries held before eviction kicks in.
    #[builder(default = 100_000)]
    max_capacity: u64,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone)]
struct CachedLink {
    link: Link,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, CachedLink> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedLink,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedLink,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process implementation of [`LinkCache`] backed by moka.
///
/// Used for single-node deployments and tests. Expired entries are never
/// returned, and conditional writes go through moka's entry API so
/// concurrent callers see exactly one winner.
#[derive(Clone)]
pub struct MokaLinkCache {
    inner: Cache<String, CachedLink>,
}

impl MokaLinkCache {
    pub fn new(config: MokaCacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        debug!(max_capacity = config.max_capacity, "moka link cache initialized");
        Self { inner }
    }

    /// Number of entries currently tracked, including ones pending eviction.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MokaLinkCache {
    fn default() -> Self {
        Self::new(MokaCacheConfig::default())
    }
}

#[async_trait]
impl LinkCache for MokaLinkCache {
    async fn get_link(&self, code: &ShortCode) -> Result<Option<Link>> {
        let hit = self.inner.get(code.as_str()).await.map(|cached| cached.link);
        trace!(code = %code, hit = hit.is_some(), "moka lookup");
        Ok(hit)
    }

    async fn set_link(&self, link: &Link, ttl: Duration) -> Result<()> {
        let cached = CachedLink {
            link: link.clone(),
            ttl,
        };
        self.inner.insert(link.code().to_string(), cached).await;
        Ok(())
    }

    async fn set_link_if_absent(&self, link: &Link, ttl: Duration) -> Result<bool> {
        let cached = CachedLink {
            link: link.clone(),
            ttl,
        };
        let entry = self
            .inner
            .entry(link.code().to_string())
            .or_insert(cached)
            .await;
        Ok(entry.is_fresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::TemporaryLink;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn temp(c: &str, url: &str) -> Link {
        Link::Temporary(TemporaryLink {
            code: code(c),
            original_url: url.to_string(),
        })
    }

    #[tokio::test]
    async fn set_then_get() {
        let cache = MokaLinkCache::default();
        let link = temp("abc123", "https://example.com");

        cache
            .set_link(&link, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get_link(&code("abc123")).await.unwrap(), Some(link));
        assert_eq!(cache.get_link(&code("zzz999")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_keeps_first_writer() {
        let cache = MokaLinkCache::default();
        let first = temp("dup001", "https://first.example");
        let second = temp("dup001", "https://second.example");

        assert!(cache
            .set_link_if_absent(&first, Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!cache
            .set_link_if_absent(&second, Duration::from_secs(60))
            .await
            .unwrap());

        let got = cache.get_link(&code("dup001")).await.unwrap().unwrap();
        assert_eq!(got.original_url(), "https://first.example");
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let cache = MokaLinkCache::default();
        cache
            .set_link(&temp("ovr001", "https://a.example"), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set_link(&temp("ovr001", "https://b.example"), Duration::from_secs(60))
            .await
            .unwrap();

        let got = cache.get_link(&code("ovr001")).await.unwrap().unwrap();
        assert_eq!(got.original_url(), "https://b.example");
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MokaLinkCache::default();
        cache
            .set_link(&temp("ttl001", "https://example.com"), Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get_link(&code("ttl001")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_can_be_claimed_again() {
        let cache = MokaLinkCache::default();
        let link = temp("exp001", "https://example.com");
        assert!(cache
            .set_link_if_absent(&link, Duration::from_millis(50))
            .await
            .unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache
            .set_link_if_absent(&link, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let cache = MokaLinkCache::default();
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let link = temp("race01", &format!("https://{i}.example"));
                cache
                    .set_link_if_absent(&link, Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
