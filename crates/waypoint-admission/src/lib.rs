//! Admission control in front of the link service.
//!
//! Two interchangeable designs sit behind [`AdmissionController`]:
//!
//! - **Local token buckets** ([`TokenBucketAdmission`]): a global bucket
//!   plus one bucket per origin, kept in process.
//! - **Distributed fixed windows** ([`FixedWindowAdmission`]): per-window
//!   counters in a shared store such as Redis. Counter failures admit the
//!   request.
//!
//! Both reject with [`AdmissionError::Overloaded`] when the service-wide
//! limit is hit and [`AdmissionError::RateLimited`] when a single origin is
//! over its own limit.

pub mod clock;
pub mod counter;
pub mod error;
pub mod token_bucket;
pub mod window;

use async_trait::async_trait;

pub use clock::{Clock, SystemClock};
pub use counter::{MemoryWindowCounter, RedisWindowCounter, WindowCounter};
pub use error::{AdmissionError, CounterError};
pub use token_bucket::{TokenBucket, TokenBucketAdmission, TokenBucketSettings};
pub use window::{FixedWindowAdmission, FixedWindowSettings};

/// Decides whether a request from `origin` may proceed.
#[async_trait]
pub trait AdmissionController: Send + Sync + 'static {
    async fn admit(&self, origin: &str) -> Result<(), AdmissionError>;
}

/// The admission design chosen at startup.
pub enum Admission {
    Local(TokenBucketAdmission),
    Distributed(FixedWindowAdmission<Box<dyn WindowCounter>>),
}

impl Admission {
    /// Local token buckets. Must be called from within a Tokio runtime.
    pub fn local(settings: TokenBucketSettings) -> Self {
        Admission::Local(TokenBucketAdmission::new(settings))
    }

    pub fn distributed(counter: impl WindowCounter, settings: FixedWindowSettings) -> Self {
        Admission::Distributed(FixedWindowAdmission::new(Box::new(counter), settings))
    }

    /// Stops background work owned by the controller.
    pub async fn shutdown(&self) {
        if let Admission::Local(local) = self {
            local.shutdown().await;
        }
    }
}

#[async_trait]
impl AdmissionController for Admission {
    async fn admit(&self, origin: &str) -> Result<(), AdmissionError> {
        match self {
            Admission::Local(local) => local.admit(origin).await,
            Admission::Distributed(distributed) => distributed.admit(origin).await,
        }
    }
}
