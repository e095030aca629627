//! Route maps between foreign protocol ids and internal entity ids.
//!
//! A protocol adapter keeps one route map per entity class. Entries are
//! written only by lifecycle event handlers; the adapter itself only reads.

use crate::bicache::BiCache;
use crate::error::CacheResult;
use std::sync::Arc;
use thingbus_store::KvStore;

/// Foreign id <-> internal id mapping scoped by an entity-class prefix.
///
/// Keys are `<prefix>:ext:<foreign id>` and `<prefix>:int:<internal id>`,
/// so thing and channel maps sharing a store never collide.
#[derive(Clone)]
pub struct RouteMap {
    pairs: BiCache,
}

impl RouteMap {
    pub fn new(store: Arc<dyn KvStore>, prefix: &str) -> Self {
        Self {
            pairs: BiCache::new(
                store,
                format!("route:{prefix}"),
                format!("{prefix}:ext"),
                format!("{prefix}:int"),
            ),
        }
    }

    /// Map `foreign_id` to `internal_id`.
    pub async fn save(&self, foreign_id: &str, internal_id: &str) -> CacheResult<()> {
        self.pairs.save(foreign_id, internal_id).await
    }

    /// Resolve a foreign id to the internal id (uplink).
    pub async fn get(&self, foreign_id: &str) -> CacheResult<String> {
        self.pairs.get(foreign_id).await
    }

    /// Resolve an internal id to the foreign id (downlink).
    pub async fn foreign_id(&self, internal_id: &str) -> CacheResult<String> {
        self.pairs.get_reverse(internal_id).await
    }

    /// Forget the mapping of an internal id. Returns `false` if none existed.
    pub async fn remove(&self, internal_id: &str) -> CacheResult<bool> {
        self.pairs.remove_reverse(internal_id).await
    }
}
