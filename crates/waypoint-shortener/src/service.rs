use std::time::Duration;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;
use waypoint_core::{Link, NewPermanentLink, ShortCode, StorageError, TemporaryLink};
use waypoint_generator::Generator;

use crate::error::ShortenerError;
use crate::repository::LinkRepository;

/// Tunables for [`LinkService`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// How many fresh codes to try before giving up on collisions.
    #[builder(default = 10)]
    pub max_attempts: usize,
    /// Longest accepted destination URL, in bytes.
    #[builder(default = 100)]
    pub max_url_len: usize,
    /// Lifetime of links created without an owner.
    #[builder(default = Duration::from_secs(24 * 60 * 60))]
    pub temporary_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Creates and resolves links.
///
/// An empty owner id produces a temporary link held only in the cache tier;
/// any other owner id produces a permanent link in the durable tier.
/// Collisions on a generated code are retried with a fresh code up to
/// [`ServiceConfig::max_attempts`] times. Any other storage error aborts
/// the call immediately.
#[derive(Debug, Clone)]
pub struct LinkService<R, G> {
    repository: R,
    generator: G,
    config: ServiceConfig,
}

impl<R: LinkRepository, G: Generator> LinkService<R, G> {
    pub fn new(repository: R, generator: G) -> Self {
        Self::with_config(repository, generator, ServiceConfig::default())
    }

    pub fn with_config(repository: R, generator: G, config: ServiceConfig) -> Self {
        Self {
            repository,
            generator,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn validate_url(&self, url: &str) -> Result<(), ShortenerError> {
        if url.len() > self.config.max_url_len {
            return Err(ShortenerError::UrlTooLong {
                len: url.len(),
                max: self.config.max_url_len,
            });
        }

        url::Url::parse(url)
            .map(|_| ())
            .map_err(|e| ShortenerError::InvalidUrl(format!("{url}: {e}")))
    }

    /// Saves `original_url` under a freshly generated code.
    ///
    /// # Arguments
    ///
    /// * `original_url` - Absolute URL to redirect to
    /// * `owner_id` - Opaque caller identity, empty for anonymous callers
    pub async fn shorten(&self, original_url: &str, owner_id: &str) -> Result<Link, ShortenerError> {
        self.validate_url(original_url)?;

        for attempt in 1..=self.config.max_attempts {
            let code = self.generator.generate()?;
            trace!(code = %code, attempt, "trying generated code");

            let saved = if owner_id.is_empty() {
                let link = TemporaryLink {
                    code,
                    original_url: original_url.to_string(),
                };
                self.repository
                    .save_temporary(link, self.config.temporary_ttl)
                    .await
                    .map(Link::Temporary)
            } else {
                let link = NewPermanentLink {
                    code,
                    original_url: original_url.to_string(),
                    owner_id: owner_id.to_string(),
                };
                self.repository
                    .save_permanent(link)
                    .await
                    .map(Link::Permanent)
            };

            match saved {
                Ok(link) => {
                    debug!(code = %link.code(), attempt, "link created");
                    return Ok(link);
                }
                Err(StorageError::Conflict(code)) => {
                    debug!(code = %code, attempt, "code collision, retrying");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "link creation failed");
                    return Err(ShortenerError::CreationFailed(e));
                }
            }
        }

        warn!(
            attempts = self.config.max_attempts,
            "exhausted code attempts"
        );
        Err(ShortenerError::CreationExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Resolves a code to its link.
    pub async fn get(&self, code: &ShortCode) -> Result<Link, ShortenerError> {
        match self.repository.get(code).await {
            Ok(Some(link)) => Ok(link),
            Ok(None) => Err(ShortenerError::LinkNotFound(code.to_string())),
            Err(e) => Err(ShortenerError::Storage(e)),
        }
    }
}
