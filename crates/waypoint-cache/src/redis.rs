use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, trace, warn};
use waypoint_core::cache::Result;
use waypoint_core::{CacheError, Link, LinkCache, ShortCode};

/// Default namespace for link keys.
pub const DEFAULT_KEY_PREFIX: &str = "link:";

/// A Redis-based implementation of [`LinkCache`].
///
/// Links are stored as JSON strings under `{prefix}{code}` with a
/// millisecond TTL. Conditional writes use `SET NX PX`, so the existence
/// check and the write happen in one command.
#[derive(Debug, Clone)]
pub struct RedisLinkCache {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() || message.to_ascii_lowercase().contains("timed out") {
        CacheError::Timeout(message)
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

/// Redis rejects `PX 0`, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisLinkCache {
    /// Creates a new Redis link cache using the `link:` key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, DEFAULT_KEY_PREFIX)
    }

    /// Creates a new Redis link cache with a custom key prefix.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `key_prefix` - Custom prefix for cache keys (e.g., "myapp:link:")
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a multiplexed connection and builds a cache on top of it.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Initialization(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::new(conn))
    }

    fn cache_key(&self, code: &ShortCode) -> String {
        format!("{}{}", self.key_prefix, code.as_str())
    }

    fn encode(link: &Link) -> Result<String> {
        serde_json::to_string(link).map_err(|e| {
            warn!(code = %link.code(), error = %e, "Failed to serialize link for caching");
            CacheError::Serialization(format!("failed to serialize cache value: {e}"))
        })
    }
}

#[async_trait]
impl LinkCache for RedisLinkCache {
    async fn get_link(&self, code: &ShortCode) -> Result<Option<Link>> {
        let key = self.cache_key(code);
        trace!(code = %code, "Fetching link from Redis cache");

        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(cached)) => {
                debug!(code = %code, "Cache hit in Redis");
                serde_json::from_str::<Link>(&cached).map(Some).map_err(|e| {
                    warn!(code = %code, error = %e, "Failed to deserialize cached link");
                    CacheError::InvalidData(format!("invalid cached value for key '{key}': {e}"))
                })
            }
            Ok(None) => {
                trace!(code = %code, "Cache miss in Redis");
                Ok(None)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Redis error on get");
                Err(map_redis_error("failed to fetch value from Redis", e))
            }
        }
    }

    async fn set_link(&self, link: &Link, ttl: Duration) -> Result<()> {
        let key = self.cache_key(link.code());
        let json = Self::encode(link)?;

        let mut conn = self.conn.clone();
        match conn.pset_ex::<_, _, ()>(&key, json, ttl_millis(ttl)).await {
            Ok(()) => {
                debug!(code = %link.code(), ttl_ms = ttl_millis(ttl), "Cached link in Redis");
                Ok(())
            }
            Err(e) => {
                warn!(code = %link.code(), error = %e, "Failed to cache link in Redis");
                Err(map_redis_error("failed to write value to Redis", e))
            }
        }
    }

    async fn set_link_if_absent(&self, link: &Link, ttl: Duration) -> Result<bool> {
        let key = self.cache_key(link.code());
        let json = Self::encode(link)?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(json)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(code = %link.code(), error = %e, "Redis error on conditional set");
                map_redis_error("failed to write value to Redis", e)
            })?;

        let written = reply.is_some();
        debug!(code = %link.code(), written, "Conditional set in Redis");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_one_millisecond() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }
}
