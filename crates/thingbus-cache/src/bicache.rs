//! Bidirectional cache over a keyed store.
//!
//! A pair `(a, b)` is stored as `<forward>:<a> = b` and `<reverse>:<b> = a`.
//! Both caches in this crate are thin wrappers that pick the prefixes.

use crate::error::{CacheError, CacheResult};
use std::sync::Arc;
use thingbus_store::KvStore;

/// Two keyed entries per logical pair, so lookup works in either direction.
#[derive(Clone)]
pub struct BiCache {
    store: Arc<dyn KvStore>,
    name: String,
    forward: String,
    reverse: String,
}

impl BiCache {
    /// Create a cache named `name` using the given key prefixes.
    pub fn new(
        store: Arc<dyn KvStore>,
        name: impl Into<String>,
        forward: impl Into<String>,
        reverse: impl Into<String>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }

    /// Cache name used in error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forward_key(&self, a: &str) -> String {
        format!("{}:{}", self.forward, a)
    }

    pub fn reverse_key(&self, b: &str) -> String {
        format!("{}:{}", self.reverse, b)
    }

    /// Store the pair. Writes the forward entry, then the reverse one.
    ///
    /// A previous pair of `a` or of `b` is unlinked first, so neither side
    /// keeps pointing at a value that moved to a new owner.
    ///
    /// If the second write fails the pair is half-written and the error is
    /// returned; saving the same pair again overwrites both entries.
    pub async fn save(&self, a: &str, b: &str) -> CacheResult<()> {
        let forward = self.forward_key(a);
        let reverse = self.reverse_key(b);
        let mut unlink = Vec::new();
        if let Some(old_b) = self.current(&forward).await.map_err(|e| self.save_error(e))?
            && old_b != b
        {
            unlink.push((self.reverse_key(&old_b), a));
        }
        if let Some(old_a) = self.current(&reverse).await.map_err(|e| self.save_error(e))?
            && old_a != a
        {
            unlink.push((self.forward_key(&old_a), b));
        }
        // Only entries still pointing back into this pair are stale
        let mut stale = Vec::new();
        for (key, owner) in &unlink {
            let current = self.current(key).await.map_err(|e| self.save_error(e))?;
            if current.as_deref() == Some(*owner) {
                stale.push(key.as_str());
            }
        }
        if !stale.is_empty() {
            self.store
                .delete(&stale)
                .await
                .map_err(|source| self.save_error(source))?;
        }

        self.store
            .set(&forward, b)
            .await
            .map_err(|source| self.save_error(source))?;
        self.store
            .set(&reverse, a)
            .await
            .map_err(|source| self.save_error(source))
    }

    /// Resolve `a` to `b`.
    pub async fn get(&self, a: &str) -> CacheResult<String> {
        self.lookup(self.forward_key(a), a).await
    }

    /// Resolve `b` to `a`.
    pub async fn get_reverse(&self, b: &str) -> CacheResult<String> {
        self.lookup(self.reverse_key(b), b).await
    }

    /// Remove the pair containing `a`. Returns `false` if it was absent.
    ///
    /// The reverse entry is deleted only while it still points back at `a`;
    /// if `b` has since been paired with another value that pair survives.
    pub async fn remove(&self, a: &str) -> CacheResult<bool> {
        let forward = self.forward_key(a);
        let Some(b) = self.resolve(&forward).await? else {
            return Ok(false);
        };
        self.delete_pair(&forward, &self.reverse_key(&b), a).await
    }

    /// Remove the pair containing `b`. Returns `false` if it was absent.
    ///
    /// Mirrors [`BiCache::remove`]: a forward entry of `a` that now maps to
    /// another value is left alone.
    pub async fn remove_reverse(&self, b: &str) -> CacheResult<bool> {
        let reverse = self.reverse_key(b);
        let Some(a) = self.resolve(&reverse).await? else {
            return Ok(false);
        };
        self.delete_pair(&reverse, &self.forward_key(&a), b).await
    }

    async fn lookup(&self, key: String, raw: &str) -> CacheResult<String> {
        match self.store.get(&key).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(CacheError::NotFound {
                cache: self.name.clone(),
                key: raw.to_string(),
            }),
            Err(source) => Err(CacheError::Lookup {
                cache: self.name.clone(),
                source,
            }),
        }
    }

    async fn current(&self, key: &str) -> Result<Option<String>, thingbus_store::StoreError> {
        self.store.get(key).await
    }

    async fn resolve(&self, key: &str) -> CacheResult<Option<String>> {
        self.current(key).await.map_err(|source| self.remove_error(source))
    }

    /// Delete `own` and, if it still points back at `value`, `counterpart`.
    async fn delete_pair(&self, own: &str, counterpart: &str, value: &str) -> CacheResult<bool> {
        let mut keys = vec![own];
        if self.resolve(counterpart).await?.as_deref() == Some(value) {
            keys.push(counterpart);
        }
        self.store
            .delete(&keys)
            .await
            .map(|_| true)
            .map_err(|source| self.remove_error(source))
    }

    fn remove_error(&self, source: thingbus_store::StoreError) -> CacheError {
        CacheError::Remove {
            cache: self.name.clone(),
            source,
        }
    }

    fn save_error(&self, source: thingbus_store::StoreError) -> CacheError {
        CacheError::Save {
            cache: self.name.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingbus_store::MemoryStore;

    fn cache() -> (Arc<MemoryStore>, BiCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = BiCache::new(store.clone(), "test", "fwd", "rev");
        (store, cache)
    }

    #[tokio::test]
    async fn test_save_then_lookup_both_directions() {
        let (_, cache) = cache();
        cache.save("a", "b").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), "b");
        assert_eq!(cache.get_reverse("b").await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_remove_deletes_both_entries() {
        let (store, cache) = cache();
        cache.save("a", "b").await.unwrap();
        assert!(cache.remove("a").await.unwrap());

        assert!(cache.get("a").await.unwrap_err().is_not_found());
        assert!(cache.get_reverse("b").await.unwrap_err().is_not_found());
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_reverse_deletes_both_entries() {
        let (store, cache) = cache();
        cache.save("a", "b").await.unwrap();
        assert!(cache.remove_reverse("b").await.unwrap());
        assert!(cache.get("a").await.unwrap_err().is_not_found());
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_double_remove_is_idempotent() {
        let (_, cache) = cache();
        cache.save("a", "b").await.unwrap();
        assert!(cache.remove("a").await.unwrap());
        assert!(!cache.remove("a").await.unwrap());
        assert!(!cache.remove_reverse("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_half_written_pair_heals_on_save() {
        let (store, cache) = cache();
        // Forward entry written, reverse write lost
        store.set(&cache.forward_key("a"), "b").await.unwrap();
        assert!(cache.get_reverse("b").await.unwrap_err().is_not_found());

        cache.save("a", "b").await.unwrap();
        assert_eq!(cache.get_reverse("b").await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_value_moved_to_new_owner_survives_old_owner_removal() {
        let (store, cache) = cache();
        // "shared" is reassigned from owner-1 to owner-2
        cache.save("shared", "owner-1").await.unwrap();
        cache.save("shared", "owner-2").await.unwrap();
        assert!(cache.get_reverse("owner-1").await.unwrap_err().is_not_found());

        assert!(!cache.remove_reverse("owner-1").await.unwrap());
        assert_eq!(cache.get("shared").await.unwrap(), "owner-2");
        assert_eq!(cache.get_reverse("owner-2").await.unwrap(), "shared");
        assert_eq!(store.key_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_keeps_counterpart_that_moved_on() {
        let (store, cache) = cache();
        // Stale entry left by an older writer: rev:b now belongs to "c"
        store.set(&cache.forward_key("a"), "b").await.unwrap();
        store.set(&cache.forward_key("c"), "b").await.unwrap();
        store.set(&cache.reverse_key("b"), "c").await.unwrap();

        assert!(cache.remove("a").await.unwrap());
        assert!(cache.get("a").await.unwrap_err().is_not_found());
        assert_eq!(cache.get_reverse("b").await.unwrap(), "c");
        assert_eq!(cache.get("c").await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_save_moves_key_to_new_value() {
        let (store, cache) = cache();
        cache.save("a", "old").await.unwrap();
        cache.save("a", "new").await.unwrap();
        assert!(cache.get_reverse("old").await.unwrap_err().is_not_found());
        assert_eq!(cache.get_reverse("new").await.unwrap(), "a");
        assert_eq!(store.key_count(), 2);
    }

    #[tokio::test]
    async fn test_key_layout() {
        let (store, cache) = cache();
        cache.save("a", "b").await.unwrap();
        assert_eq!(store.get("fwd:a").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.get("rev:b").await.unwrap().as_deref(), Some("a"));
    }
}
