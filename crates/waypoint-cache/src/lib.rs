//! Cache tier adapters for Waypoint links.

pub mod moka;
pub mod redis;

pub use moka::{MokaCacheConfig, MokaLinkCache};
pub use redis::RedisLinkCache;
pub use waypoint_core::cache::{LinkCache, Result};
pub use waypoint_core::CacheError;
