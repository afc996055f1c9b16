//! Core types and traits for the Waypoint link service.
//!
//! This crate provides the link model and the contracts of the two storage
//! tiers, shared by the adapters and the shortener service.

pub mod cache;
pub mod error;
pub mod link;
pub mod repository;
pub mod shortcode;

pub use cache::LinkCache;
pub use error::{CacheError, CoreError, StorageError};
pub use link::{Link, NewPermanentLink, PermanentLink, TemporaryLink};
pub use repository::DurableStore;
pub use shortcode::ShortCode;
