use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// An unowned link that only lives in the cache tier until its TTL runs out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryLink {
    pub code: ShortCode,
    pub original_url: String,
}

/// A link owned by an authenticated caller and persisted in the durable tier.
///
/// `id` and `created_at` are assigned by the durable store on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermanentLink {
    pub id: String,
    pub code: ShortCode,
    pub original_url: String,
    pub owner_id: String,
    pub created_at: Timestamp,
}

/// A permanent link that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermanentLink {
    pub code: ShortCode,
    pub original_url: String,
    pub owner_id: String,
}

/// Either kind of link.
///
/// Callers outside the storage layer should stick to [`Link::code`] and
/// [`Link::original_url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Link {
    Temporary(TemporaryLink),
    Permanent(PermanentLink),
}

impl Link {
    pub fn code(&self) -> &ShortCode {
        match self {
            Link::Temporary(link) => &link.code,
            Link::Permanent(link) => &link.code,
        }
    }

    pub fn original_url(&self) -> &str {
        match self {
            Link::Temporary(link) => &link.original_url,
            Link::Permanent(link) => &link.original_url,
        }
    }

    /// Returns the stored permanent link, if this is one.
    pub fn as_permanent(&self) -> Option<&PermanentLink> {
        match self {
            Link::Permanent(link) => Some(link),
            Link::Temporary(_) => None,
        }
    }
}

impl From<TemporaryLink> for Link {
    fn from(link: TemporaryLink) -> Self {
        Link::Temporary(link)
    }
}

impl From<PermanentLink> for Link {
    fn from(link: PermanentLink) -> Self {
        Link::Permanent(link)
    }
}
