use async_trait::async_trait;
use std::time::Duration;
use tracing::{trace, warn};

use crate::counter::WindowCounter;
use crate::error::CounterError;

/// Window counters kept in Redis, shared by every instance of the service.
///
/// All increments for one request go out in a single pipeline. Keys that
/// come back with a count of one were created by this call and get their
/// expiry armed in a second round trip; a failure there is only logged,
/// since the next window uses a fresh key anyway.
#[derive(Debug, Clone)]
pub struct RedisWindowCounter {
    conn: redis::aio::MultiplexedConnection,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CounterError {
    let message = format!("{operation}: {err}");
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CounterError::Unavailable(message)
    } else {
        CounterError::Operation(message)
    }
}

impl RedisWindowCounter {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Opens a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, CounterError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CounterError::Unavailable(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl WindowCounter for RedisWindowCounter {
    async fn increment(&self, keys: &[String], expiry: Duration) -> Result<Vec<u64>, CounterError> {
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.incr(key, 1_u64);
        }
        let counts: Vec<u64> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to increment window counters", e))?;

        let expiry_ms = i64::try_from(expiry.as_millis()).unwrap_or(i64::MAX);
        let mut arm = redis::pipe();
        let mut fresh = 0;
        for (key, count) in keys.iter().zip(&counts) {
            if *count == 1 {
                arm.pexpire(key, expiry_ms).ignore();
                fresh += 1;
            }
        }
        if fresh > 0 {
            if let Err(e) = arm.query_async::<()>(&mut conn).await {
                warn!(error = %e, "failed to arm window counter expiry");
            }
        }

        trace!(?counts, "window counters incremented");
        Ok(counts)
    }
}
