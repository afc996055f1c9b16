//! Admission over fixed-window counters kept in a shared store.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::clock::{Clock, SystemClock};
use crate::counter::WindowCounter;
use crate::{AdmissionController, AdmissionError};

#[derive(Debug, Clone, TypedBuilder)]
pub struct FixedWindowSettings {
    /// Requests admitted per window across all origins.
    #[builder(default = 100)]
    pub global_limit: u64,
    /// Requests admitted per window from a single origin.
    #[builder(default = 10)]
    pub origin_limit: u64,
    /// Window length in whole seconds.
    #[builder(default = 1)]
    pub window_secs: u64,
    /// Lifetime of a window's keys, set when the key is created. Never
    /// shorter than the window plus one second, see [`Self::expiry`].
    #[builder(default = Duration::from_secs(2))]
    pub key_expiry: Duration,
    #[builder(default = "rl:".to_string(), setter(into))]
    pub key_prefix: String,
}

impl Default for FixedWindowSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FixedWindowSettings {
    /// Expiry armed on a window's keys. A key must outlive its window or the
    /// count restarts before the window ends.
    pub fn expiry(&self) -> Duration {
        let floor = Duration::from_secs(self.window_secs.max(1).saturating_add(1));
        self.key_expiry.max(floor)
    }
}

/// Fixed-window admission controller.
///
/// Each request increments a global key and a per-origin key for the
/// current window. The global limit is checked first. If the counter store
/// fails, the request is admitted and the failure is logged.
pub struct FixedWindowAdmission<W, K = SystemClock> {
    counter: W,
    clock: K,
    settings: FixedWindowSettings,
}

impl<W: WindowCounter> FixedWindowAdmission<W> {
    pub fn new(counter: W, settings: FixedWindowSettings) -> Self {
        Self::with_clock(counter, SystemClock, settings)
    }
}

impl<W: WindowCounter, K: Clock> FixedWindowAdmission<W, K> {
    pub fn with_clock(counter: W, clock: K, settings: FixedWindowSettings) -> Self {
        Self {
            counter,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &FixedWindowSettings {
        &self.settings
    }

    fn window(&self) -> i64 {
        let secs = i64::try_from(self.settings.window_secs.max(1)).unwrap_or(i64::MAX);
        self.clock.now().as_second().div_euclid(secs)
    }

    fn keys(&self, origin: &str) -> [String; 2] {
        let prefix = &self.settings.key_prefix;
        let window = self.window();
        [
            format!("{prefix}g:{window}"),
            format!("{prefix}i:{origin}:{window}"),
        ]
    }
}

#[async_trait]
impl<W: WindowCounter, K: Clock> AdmissionController for FixedWindowAdmission<W, K> {
    async fn admit(&self, origin: &str) -> Result<(), AdmissionError> {
        let keys = self.keys(origin);
        let counts = match self
            .counter
            .increment(&keys, self.settings.expiry())
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!(origin, error = %e, "window counter unavailable, admitting request");
                return Ok(());
            }
        };

        let [global, per_origin] = counts[..] else {
            warn!(
                origin,
                returned = counts.len(),
                "unexpected counter reply, admitting request"
            );
            return Ok(());
        };

        if global > self.settings.global_limit {
            warn!(
                origin,
                global,
                limit = self.settings.global_limit,
                "global window limit exceeded"
            );
            return Err(AdmissionError::Overloaded);
        }
        if per_origin > self.settings.origin_limit {
            debug!(
                origin,
                count = per_origin,
                limit = self.settings.origin_limit,
                "origin window limit exceeded"
            );
            return Err(AdmissionError::RateLimited {
                origin: origin.to_string(),
            });
        }

        trace!(origin, global, per_origin, "admitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::TestClock;
    use crate::counter::MemoryWindowCounter;
    use crate::error::CounterError;
    use jiff::{SignedDuration, Timestamp};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn settings(global_limit: u64, origin_limit: u64) -> FixedWindowSettings {
        FixedWindowSettings::builder()
            .global_limit(global_limit)
            .origin_limit(origin_limit)
            .build()
    }

    fn clock() -> TestClock {
        TestClock::new(Timestamp::from_second(1_700_000_000).unwrap())
    }

    /// Counter that always fails.
    struct DownCounter;

    #[async_trait]
    impl WindowCounter for DownCounter {
        async fn increment(
            &self,
            _keys: &[String],
            _expiry: Duration,
        ) -> Result<Vec<u64>, CounterError> {
            Err(CounterError::Unavailable("connection refused".into()))
        }
    }

    /// Counter that records the keys it was asked to bump.
    #[derive(Default)]
    struct RecordingCounter {
        inner: MemoryWindowCounter,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WindowCounter for RecordingCounter {
        async fn increment(
            &self,
            keys: &[String],
            expiry: Duration,
        ) -> Result<Vec<u64>, CounterError> {
            self.seen.lock().extend(keys.iter().cloned());
            self.inner.increment(keys, expiry).await
        }
    }

    #[tokio::test]
    async fn keys_are_namespaced_by_window() {
        let counter = Arc::new(RecordingCounter::default());
        let admission =
            FixedWindowAdmission::with_clock(Arc::clone(&counter), clock(), settings(10, 10));

        admission.admit("10.0.0.1").await.unwrap();

        assert_eq!(
            *counter.seen.lock(),
            vec![
                "rl:g:1700000000".to_string(),
                "rl:i:10.0.0.1:1700000000".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn origin_limit_yields_rate_limited() {
        let admission =
            FixedWindowAdmission::with_clock(MemoryWindowCounter::new(), clock(), settings(10, 2));

        assert!(admission.admit("a").await.is_ok());
        assert!(admission.admit("a").await.is_ok());
        let err = admission.admit("a").await.unwrap_err();
        assert_eq!(err, AdmissionError::RateLimited { origin: "a".into() });
        assert_eq!(err.status_code(), 429);
        assert!(admission.admit("b").await.is_ok());
    }

    #[tokio::test]
    async fn next_window_starts_fresh() {
        let clock = clock();
        let admission = FixedWindowAdmission::with_clock(
            MemoryWindowCounter::new(),
            clock.clone(),
            settings(10, 1),
        );

        assert!(admission.admit("a").await.is_ok());
        assert!(admission.admit("a").await.is_err());

        clock.advance(SignedDuration::from_secs(1));
        assert!(admission.admit("a").await.is_ok());
    }

    #[tokio::test]
    async fn global_limit_wins_regardless_of_arrival_order() {
        // Each origin stays under its own limit of 2, together they exceed 3.
        for order in [["a", "a", "b", "b"], ["a", "b", "a", "b"], ["b", "a", "b", "a"]] {
            let admission = FixedWindowAdmission::with_clock(
                MemoryWindowCounter::new(),
                clock(),
                settings(3, 2),
            );

            let mut overloaded = 0;
            for origin in order {
                match admission.admit(origin).await {
                    Ok(()) => {}
                    Err(AdmissionError::Overloaded) => overloaded += 1,
                    Err(other) => panic!("unexpected rejection {other:?}"),
                }
            }
            assert_eq!(overloaded, 1, "order {order:?}");
        }
    }

    #[test]
    fn expiry_covers_the_window() {
        assert_eq!(FixedWindowSettings::default().expiry(), Duration::from_secs(2));

        let long = FixedWindowSettings::builder().window_secs(10).build();
        assert_eq!(long.expiry(), Duration::from_secs(11));

        let generous = FixedWindowSettings::builder()
            .window_secs(10)
            .key_expiry(Duration::from_secs(30))
            .build();
        assert_eq!(generous.expiry(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn long_window_holds_its_count() {
        let clock = clock();
        let admission = FixedWindowAdmission::with_clock(
            MemoryWindowCounter::new(),
            clock.clone(),
            FixedWindowSettings::builder()
                .origin_limit(1)
                .window_secs(10)
                .build(),
        );

        assert!(admission.admit("a").await.is_ok());
        assert!(admission.admit("a").await.is_err());

        // Still inside the same 10s window.
        tokio::time::advance(Duration::from_secs(3)).await;
        clock.advance(SignedDuration::from_secs(3));
        assert!(admission.admit("a").await.is_err());

        tokio::time::advance(Duration::from_secs(7)).await;
        clock.advance(SignedDuration::from_secs(7));
        assert!(admission.admit("a").await.is_ok());
    }

    #[tokio::test]
    async fn counter_failure_fails_open() {
        let admission = FixedWindowAdmission::with_clock(DownCounter, clock(), settings(0, 0));

        for _ in 0..100 {
            assert!(admission.admit("10.0.0.1").await.is_ok());
        }
    }
}
