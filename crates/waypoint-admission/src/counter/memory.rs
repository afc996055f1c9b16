use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::counter::WindowCounter;
use crate::error::CounterError;

/// Expired keys are purged once every this many increments.
const PURGE_EVERY: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Instant,
}

/// In-process window counters. Only meaningful for a single instance.
#[derive(Debug, Default)]
pub struct MemoryWindowCounter {
    slots: DashMap<String, Slot>,
    ops: AtomicU64,
}

impl MemoryWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every expired key.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| slot.expires_at > now);
    }

    fn bump(&self, key: &str, expiry: Duration, now: Instant) -> u64 {
        let mut slot = self.slots.entry(key.to_string()).or_insert(Slot {
            count: 0,
            expires_at: now + expiry,
        });
        if slot.expires_at <= now {
            *slot = Slot {
                count: 0,
                expires_at: now + expiry,
            };
        }
        slot.count += 1;
        slot.count
    }
}

#[async_trait]
impl WindowCounter for MemoryWindowCounter {
    async fn increment(&self, keys: &[String], expiry: Duration) -> Result<Vec<u64>, CounterError> {
        let now = Instant::now();
        let counts = keys.iter().map(|key| self.bump(key, expiry, now)).collect();

        if self.ops.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn counts_accumulate_per_key() {
        let counter = MemoryWindowCounter::new();
        let expiry = Duration::from_secs(2);

        assert_eq!(counter.increment(&keys(&["g", "a"]), expiry).await.unwrap(), vec![1, 1]);
        assert_eq!(counter.increment(&keys(&["g", "b"]), expiry).await.unwrap(), vec![2, 1]);
        assert_eq!(counter.increment(&keys(&["g", "a"]), expiry).await.unwrap(), vec![3, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_fixed_at_creation() {
        let counter = MemoryWindowCounter::new();
        let expiry = Duration::from_secs(2);

        counter.increment(&keys(&["k"]), expiry).await.unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(counter.increment(&keys(&["k"]), expiry).await.unwrap(), vec![2]);

        // Later increments did not push the expiry out.
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(counter.increment(&keys(&["k"]), expiry).await.unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_keys() {
        let counter = MemoryWindowCounter::new();
        counter
            .increment(&keys(&["old"]), Duration::from_secs(1))
            .await
            .unwrap();
        counter
            .increment(&keys(&["new"]), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        counter.purge_expired();

        assert_eq!(counter.len(), 1);
    }
}
