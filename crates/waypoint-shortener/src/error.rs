use thiserror::Error;
use waypoint_core::StorageError;
use waypoint_generator::GenerationError;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("url is {len} bytes, the limit is {max}")]
    UrlTooLong { len: usize, max: usize },
    #[error("link not found: {0}")]
    LinkNotFound(String),
    /// Every generated code collided with an existing one.
    #[error("failed to create link: no free code after {attempts} attempts")]
    CreationExhausted { attempts: usize },
    #[error("failed to create link: {0}")]
    CreationFailed(#[source] StorageError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("unexpected storage error: {0}")]
    Storage(#[source] StorageError),
}

/// Coarse classification of [`ShortenerError`] for callers deciding how to
/// respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent a malformed or oversized URL. Retrying won't help.
    InvalidInput,
    NotFound,
    /// The retry budget was spent on collisions. The whole call may be retried later.
    CreationExhausted,
    StorageUnavailable,
    /// The service could not produce a code, e.g. the entropy source failed.
    Internal,
}

impl ShortenerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShortenerError::InvalidUrl(_) | ShortenerError::UrlTooLong { .. } => {
                ErrorKind::InvalidInput
            }
            ShortenerError::LinkNotFound(_) => ErrorKind::NotFound,
            ShortenerError::CreationExhausted { .. } => ErrorKind::CreationExhausted,
            ShortenerError::Generation(_) => ErrorKind::Internal,
            ShortenerError::CreationFailed(_) | ShortenerError::Storage(_) => {
                ErrorKind::StorageUnavailable
            }
        }
    }
}
