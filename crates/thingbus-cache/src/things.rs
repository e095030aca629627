//! Thing-key cache and authentication fallback.
//!
//! The things service saves a pair right after persisting a thing and
//! removes it when the thing is deleted. The cache only accelerates
//! authentication: any miss or store failure falls through to the
//! authoritative repository.

use crate::bicache::BiCache;
use crate::error::{CacheResult, IdentifyError};
use async_trait::async_trait;
use std::sync::Arc;
use thingbus_store::KvStore;
use tracing::{debug, warn};

/// Prefix of `thing key -> thing id` entries
pub const THING_KEY_PREFIX: &str = "thing_key";

/// Prefix of `thing id -> thing key` entries
pub const THING_ID_PREFIX: &str = "thing";

/// Cache-aside mapping between thing keys and thing ids. Entries never expire.
#[derive(Clone)]
pub struct ThingCache {
    pairs: BiCache,
}

impl ThingCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            pairs: BiCache::new(store, "thing", THING_KEY_PREFIX, THING_ID_PREFIX),
        }
    }

    /// Cache the key of a newly provisioned thing.
    pub async fn save(&self, thing_key: &str, thing_id: &str) -> CacheResult<()> {
        self.pairs.save(thing_key, thing_id).await
    }

    /// Resolve a thing key to its thing id.
    pub async fn id(&self, thing_key: &str) -> CacheResult<String> {
        self.pairs.get(thing_key).await
    }

    /// Drop both entries of a deleted thing. Returns `false` if none were cached.
    pub async fn remove(&self, thing_id: &str) -> CacheResult<bool> {
        self.pairs.remove_reverse(thing_id).await
    }
}

/// Authoritative source of thing credentials.
#[async_trait]
pub trait ThingRepository: Send + Sync {
    /// Look up the thing owning `thing_key`. `Ok(None)` if no thing has it.
    async fn retrieve_by_key(&self, thing_key: &str) -> Result<Option<String>, IdentifyError>;
}

/// Resolves thing keys through the cache, falling back to the repository.
pub struct ThingIdentifier {
    cache: ThingCache,
    repository: Arc<dyn ThingRepository>,
}

impl ThingIdentifier {
    pub fn new(cache: ThingCache, repository: Arc<dyn ThingRepository>) -> Self {
        Self { cache, repository }
    }

    /// Resolve `thing_key` to a thing id.
    ///
    /// A cache miss or cache failure is never surfaced: the repository is
    /// consulted and the cache repopulated on a best-effort basis.
    pub async fn identify(&self, thing_key: &str) -> Result<String, IdentifyError> {
        match self.cache.id(thing_key).await {
            Ok(id) => return Ok(id),
            Err(e) if e.is_not_found() => debug!("Thing key cache miss"),
            Err(e) => warn!("Thing key cache unavailable, using repository: {}", e),
        }

        let id = self
            .repository
            .retrieve_by_key(thing_key)
            .await?
            .ok_or(IdentifyError::UnknownKey)?;

        if let Err(e) = self.cache.save(thing_key, &id).await {
            warn!("Failed to repopulate thing key cache for '{}': {}", id, e);
        }
        Ok(id)
    }
}
