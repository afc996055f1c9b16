use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use waypoint_core::{DurableStore, StorageError};

/// Result of a single prune pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneOutcome {
    pub removed: u64,
}

/// Periodically deletes permanent links older than `max_age`.
///
/// A failed pass is logged and the job keeps ticking. The job stops when
/// the shutdown future given to [`PruneJob::run`] resolves.
///
/// Cached mirrors of pruned links are left alone and expire on their own
/// after [`MIRROR_TTL`](crate::repository::hybrid::MIRROR_TTL).
#[derive(Debug, Clone)]
pub struct PruneJob<S> {
    store: S,
    interval: Duration,
    max_age: Duration,
}

impl<S: DurableStore> PruneJob<S> {
    pub fn new(store: S, interval: Duration, max_age: Duration) -> Self {
        Self {
            store,
            interval,
            max_age,
        }
    }

    pub async fn run_once(&self) -> Result<PruneOutcome, StorageError> {
        let removed = self.store.prune_older_than(self.max_age).await?;
        Ok(PruneOutcome { removed })
    }

    /// Runs until `shutdown` resolves. Returns the number of passes made.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        tokio::pin!(shutdown);
        let mut passes = 0;
        info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "prune job started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(passes, "prune job stopped");
                    return passes;
                }
                _ = ticker.tick() => {
                    passes += 1;
                    match self.run_once().await {
                        Ok(outcome) => debug!(removed = outcome.removed, "prune pass finished"),
                        Err(e) => error!(error = %e, "prune pass failed"),
                    }
                }
            }
        }
    }
}
