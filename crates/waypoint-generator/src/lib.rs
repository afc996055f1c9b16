pub mod random;

pub use random::RandomGenerator;

use thiserror::Error;
use waypoint_core::ShortCode;

/// The entropy source failed to produce bytes.
#[derive(Debug, Clone, Error)]
#[error("error generating code: {0}")]
pub struct GenerationError(pub String);

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage,
/// so callers must still handle collisions with existing codes.
pub trait Generator: Send + Sync + 'static {
    /// Generates a fresh short code.
    fn generate(&self) -> Result<ShortCode, GenerationError>;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&self) -> Result<ShortCode, GenerationError> {
        (**self).generate()
    }
}

impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    fn generate(&self) -> Result<ShortCode, GenerationError> {
        (**self).generate()
    }
}
