//! Link shortener service implementation.
//!
//! This crate composes the durable and cache tiers into a
//! [`HybridRepository`], and drives it from [`LinkService`], which handles
//! validation, code generation and collision retry.

pub mod error;
pub mod prune;
pub mod repository;
pub mod service;

pub use error::{ErrorKind, ShortenerError};
pub use prune::{PruneJob, PruneOutcome};
pub use repository::{HybridRepository, LinkRepository};
pub use service::{LinkService, ServiceConfig};
