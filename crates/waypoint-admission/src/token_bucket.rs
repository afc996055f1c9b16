//! Single-process admission using token buckets.
//!
//! One global bucket guards the whole service and one bucket per origin is
//! created on first sight. A background sweep evicts origins that have been
//! idle for longer than the configured TTL. State is not shared across
//! processes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use crate::{AdmissionController, AdmissionError};

#[derive(Debug, Clone, TypedBuilder)]
pub struct TokenBucketSettings {
    /// Tokens per second added to the global bucket.
    #[builder(default = 100.0)]
    pub global_rate: f64,
    #[builder(default = 200)]
    pub global_burst: u32,
    /// Tokens per second added to each origin's bucket.
    #[builder(default = 5.0)]
    pub origin_rate: f64,
    #[builder(default = 10)]
    pub origin_burst: u32,
    /// Origins untouched for this long are forgotten.
    #[builder(default = Duration::from_secs(3 * 60))]
    pub idle_ttl: Duration,
    #[builder(default = Duration::from_secs(60))]
    pub sweep_interval: Duration,
}

impl Default for TokenBucketSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A bucket holding up to `burst` tokens, refilled continuously at `rate`
/// tokens per second.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(rate: f64, burst: u32, now: Instant) -> Self {
        let burst = f64::from(burst);
        Self {
            rate,
            burst,
            tokens: burst,
            last: now,
        }
    }

    /// Takes one token if available.
    pub fn try_take(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time of the last `try_take`, or of creation.
    pub fn last_seen(&self) -> Instant {
        self.last
    }
}

#[derive(Debug)]
struct Buckets {
    settings: TokenBucketSettings,
    global: Mutex<TokenBucket>,
    origins: Mutex<HashMap<String, TokenBucket>>,
}

impl Buckets {
    fn admit(&self, origin: &str) -> Result<(), AdmissionError> {
        let now = Instant::now();

        if !self.global.lock().try_take(now) {
            warn!(origin, "global token bucket exhausted");
            return Err(AdmissionError::Overloaded);
        }

        let allowed = {
            let mut origins = self.origins.lock();
            origins
                .entry(origin.to_string())
                .or_insert_with(|| {
                    TokenBucket::new(self.settings.origin_rate, self.settings.origin_burst, now)
                })
                .try_take(now)
        };
        if !allowed {
            debug!(origin, "origin token bucket exhausted");
            return Err(AdmissionError::RateLimited {
                origin: origin.to_string(),
            });
        }

        trace!(origin, "admitted");
        Ok(())
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_ttl = self.settings.idle_ttl;
        let mut origins = self.origins.lock();
        let before = origins.len();
        origins.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen()) <= idle_ttl);
        before - origins.len()
    }
}

/// Token-bucket admission controller.
///
/// Constructing one spawns the idle-origin sweep on the current Tokio
/// runtime. The sweep stops on [`shutdown`](Self::shutdown) or when the
/// controller is dropped.
#[derive(Debug)]
pub struct TokenBucketAdmission {
    buckets: Arc<Buckets>,
    stop: Arc<Notify>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucketAdmission {
    /// Creates the controller and starts its sweep task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(settings: TokenBucketSettings) -> Self {
        info!(
            global_rate = settings.global_rate,
            global_burst = settings.global_burst,
            origin_rate = settings.origin_rate,
            origin_burst = settings.origin_burst,
            "creating token bucket admission"
        );

        let now = Instant::now();
        let buckets = Arc::new(Buckets {
            global: Mutex::new(TokenBucket::new(
                settings.global_rate,
                settings.global_burst,
                now,
            )),
            origins: Mutex::new(HashMap::new()),
            settings,
        });
        let stop = Arc::new(Notify::new());
        let sweeper = tokio::spawn(sweep_loop(Arc::clone(&buckets), Arc::clone(&stop)));

        Self {
            buckets,
            stop,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Number of origins currently tracked.
    pub fn tracked_origins(&self) -> usize {
        self.buckets.origins.lock().len()
    }

    /// Evicts idle origins now and returns how many were removed.
    pub fn sweep_idle(&self) -> usize {
        self.buckets.sweep()
    }

    /// Stops the sweep task and waits for it to finish.
    pub async fn shutdown(&self) {
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            self.stop.notify_one();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "token bucket sweep task failed");
                }
            }
        }
    }
}

impl Drop for TokenBucketAdmission {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

async fn sweep_loop(buckets: Arc<Buckets>, stop: Arc<Notify>) {
    let mut ticker = tokio::time::interval(buckets.settings.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.notified() => {
                debug!("token bucket sweep stopped");
                return;
            }
            _ = ticker.tick() => {
                let evicted = buckets.sweep();
                if evicted > 0 {
                    debug!(evicted, "evicted idle origins");
                }
            }
        }
    }
}

#[async_trait]
impl AdmissionController for TokenBucketAdmission {
    async fn admit(&self, origin: &str) -> Result<(), AdmissionError> {
        self.buckets.admit(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(global_burst: u32, origin_burst: u32) -> TokenBucketSettings {
        TokenBucketSettings::builder()
            .global_rate(1.0)
            .global_burst(global_burst)
            .origin_rate(1.0)
            .origin_burst(origin_burst)
            .idle_ttl(Duration::from_secs(10))
            .sweep_interval(Duration::from_secs(5))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(2.0, 2, Instant::now());
        assert!(bucket.try_take(Instant::now()));
        assert!(bucket.try_take(Instant::now()));
        assert!(!bucket.try_take(Instant::now()));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(bucket.try_take(Instant::now()));
        assert!(!bucket.try_take(Instant::now()));

        // Refill never exceeds the burst.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(bucket.try_take(Instant::now()));
        assert!(bucket.try_take(Instant::now()));
        assert!(!bucket.try_take(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn origin_limit_yields_rate_limited() {
        let admission = TokenBucketAdmission::new(settings(100, 2));

        assert!(admission.admit("10.0.0.1").await.is_ok());
        assert!(admission.admit("10.0.0.1").await.is_ok());
        assert_eq!(
            admission.admit("10.0.0.1").await,
            Err(AdmissionError::RateLimited {
                origin: "10.0.0.1".into()
            })
        );
        // Other origins are unaffected.
        assert!(admission.admit("10.0.0.2").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn global_limit_yields_overloaded() {
        // Each origin stays within its burst of 2, together they exceed 3.
        for order in [["a", "a", "b", "b"], ["a", "b", "a", "b"], ["b", "a", "b", "a"]] {
            let admission = TokenBucketAdmission::new(settings(3, 2));

            let mut results = Vec::new();
            for origin in order {
                results.push(admission.admit(origin).await);
            }

            assert_eq!(
                results,
                vec![Ok(()), Ok(()), Ok(()), Err(AdmissionError::Overloaded)],
                "order {order:?}"
            );
            admission.shutdown().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_idle_origins() {
        let admission = TokenBucketAdmission::new(TokenBucketSettings {
            sweep_interval: Duration::from_secs(3600),
            ..settings(100, 5)
        });
        admission.admit("old").await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        admission.admit("fresh").await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(admission.sweep_idle(), 1);
        assert_eq!(admission.tracked_origins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_runs_until_shutdown() {
        let admission = TokenBucketAdmission::new(settings(100, 5));
        admission.admit("idle").await.unwrap();
        assert_eq!(admission.tracked_origins(), 1);

        // Idle TTL is 10s and the sweep runs every 5s.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(admission.tracked_origins(), 0);

        admission.shutdown().await;
        admission.admit("late").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(admission.tracked_origins(), 1);
    }
}
