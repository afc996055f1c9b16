use thiserror::Error;

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The service-wide limit is exhausted.
    #[error("service overloaded")]
    Overloaded,
    /// The origin exceeded its own limit.
    #[error("too many requests from {origin}")]
    RateLimited { origin: String },
}

impl AdmissionError {
    /// HTTP status an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::Overloaded => 503,
            AdmissionError::RateLimited { .. } => 429,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CounterError {
    #[error("counter backend unavailable: {0}")]
    Unavailable(String),
    #[error("counter operation failed: {0}")]
    Operation(String),
}
