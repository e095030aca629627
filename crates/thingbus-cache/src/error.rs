//! Cache error types

use thingbus_store::StoreError;
use thiserror::Error;

/// Errors raised by the bidirectional caches.
///
/// Each variant names the cache it came from, so callers can tell a miss
/// apart from an unreachable store without looking at transport details.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{cache} cache has no entry for '{key}'")]
    NotFound { cache: String, key: String },

    #[error("saving to {cache} cache: {source}")]
    Save { cache: String, source: StoreError },

    #[error("reading from {cache} cache: {source}")]
    Lookup { cache: String, source: StoreError },

    #[error("removing from {cache} cache: {source}")]
    Remove { cache: String, source: StoreError },
}

impl CacheError {
    /// Check if this is a cache miss rather than a store failure
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Name of the cache that raised the error
    #[must_use]
    pub fn cache(&self) -> &str {
        match self {
            Self::NotFound { cache, .. }
            | Self::Save { cache, .. }
            | Self::Lookup { cache, .. }
            | Self::Remove { cache, .. } => cache,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised while resolving a thing key to a thing id.
#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("unknown thing key")]
    UnknownKey,

    #[error("thing repository error: {0}")]
    Repository(String),
}
