//! Named, typed cache over Moka.

use std::hash::Hash;
use std::sync::Arc;

use moka::sync::Cache;
use tracing::trace;

use super::CacheConfig;

/// A Moka cache with a name for log output.
///
/// Clones share storage, so a cache can sit inside `AppState` or a repository
/// and be handed around freely.
pub struct TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Cache<K, V>,
    name: Arc<str>,
}

// Cache<K, V> is itself an Arc handle, so no K: Clone bound is needed
impl<K, V> Clone for TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            name: Arc::clone(&self.name),
        }
    }
}

impl<K, V> TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Arc<str>>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        Self {
            entries: builder.build(),
            name: name.into(),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Returns `Some(value)` if the key exists and hasn't expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.entries.get(key);
        if value.is_none() {
            trace!("{} cache miss for {:?}", self.name, key);
        }
        value
    }

    pub fn invalidate(&self, key: &K) {
        trace!("{} cache: dropping {:?}", self.name, key);
        self.entries.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_invalidate() {
        let cache: TypedCache<u64, String> = TypedCache::new("browse", CacheConfig::browse_session());
        cache.insert(1, "page".into());
        assert_eq!(cache.get(&1).as_deref(), Some("page"));

        cache.invalidate(&1);
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache: TypedCache<i64, Option<bool>> = TypedCache::new("staff", CacheConfig::staff_lookup());
        let other = cache.clone();

        // Negative lookups are cached too
        other.insert(7, None);
        assert_eq!(cache.get(&7), Some(None));

        cache.invalidate(&7);
        assert!(other.get(&7).is_none());
    }
}
