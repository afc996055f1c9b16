use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::{SignedDuration, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use waypoint_core::repository::Result;
use waypoint_core::{DurableStore, NewPermanentLink, PermanentLink, ShortCode, StorageError};

/// In-memory implementation of [`DurableStore`] using DashMap.
///
/// DashMap's entry API makes insert-if-absent a single atomic step per
/// shard, which gives the same uniqueness guarantee as a database
/// constraint. Intended for tests and single-node setups.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    links: DashMap<String, PermanentLink>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            links: DashMap::with_capacity(capacity),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of stored links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn prune_cutoff(age: Duration) -> Timestamp {
    SignedDuration::try_from(age)
        .ok()
        .and_then(|age| Timestamp::now().checked_sub(age).ok())
        .unwrap_or(Timestamp::MIN)
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn insert(&self, link: NewPermanentLink) -> Result<PermanentLink> {
        match self.links.entry(link.code.as_str().to_owned()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(link.code.to_string())),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                let stored = PermanentLink {
                    id: format!("{id:016x}"),
                    code: link.code,
                    original_url: link.original_url,
                    owner_id: link.owner_id,
                    created_at: Timestamp::now(),
                };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn get(&self, code: &ShortCode) -> Result<Option<PermanentLink>> {
        Ok(self.links.get(code.as_str()).map(|entry| entry.clone()))
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.links.contains_key(code.as_str()))
    }

    async fn prune_older_than(&self, age: Duration) -> Result<u64> {
        let cutoff = prune_cutoff(age);
        let mut removed = 0u64;

        self.links.retain(|_, link| {
            let keep = link.created_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });

        debug!(removed, "pruned links from in-memory store");
        Ok(removed)
    }
}
