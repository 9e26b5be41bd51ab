//! Bounded least-recently-used cache for connection pools.
//!
//! The cache preserves insertion/access order in an ordered map: touching an
//! entry (read or write) moves it to the tail, so the head is always the
//! least-recently-touched entry and the single eviction victim when the bound
//! is exceeded. Eviction hands the victim back to the caller so the pool's
//! resources can be released; it never touches the tenant's data.
//!
//! First-time population uses double-checked locking: reads go straight to
//! the map, and only a miss takes the creation mutex, re-checks, and runs the
//! caller's factory. Concurrent first access to the same key builds the value
//! exactly once without serializing reads of already-cached entries.

use std::hash::Hash;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

/// A bounded LRU map from pool keys to live pools.
pub struct PoolCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: RwLock<IndexMap<K, V>>,
    /// Serializes factory invocations, not reads.
    creation: Mutex<()>,
    max_entries: usize,
}

impl<K, V> PoolCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache bounded to `max_entries` (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: RwLock::new(IndexMap::with_capacity(max_entries)),
            creation: Mutex::new(()),
            max_entries,
        }
    }

    /// Look up a value, refreshing its recency on hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write();
        let value = entries.shift_remove(key)?;
        entries.insert(key.clone(), value.clone());
        Some(value)
    }

    /// Insert or refresh a value.
    ///
    /// Returns the evicted `(key, value)` pair when the insert pushed the
    /// cache over its bound; the caller is responsible for releasing the
    /// evicted pool's resources.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut entries = self.entries.write();
        entries.shift_remove(&key);
        entries.insert(key, value);

        if entries.len() > self.max_entries {
            entries.shift_remove_index(0)
        } else {
            None
        }
    }

    /// Get the cached value for `key`, building it with `factory` on a miss.
    ///
    /// Uses double-checked locking so that under concurrent first access the
    /// factory runs at most once per key. Returns the value along with any
    /// entry evicted by the insert.
    pub fn acquire<E>(
        &self,
        key: K,
        factory: impl FnOnce() -> Result<V, E>,
    ) -> Result<(V, Option<(K, V)>), E> {
        if let Some(value) = self.get(&key) {
            return Ok((value, None));
        }

        let _creating = self.creation.lock();

        // Another thread may have populated the entry while we waited.
        if let Some(value) = self.get(&key) {
            return Ok((value, None));
        }

        let value = factory()?;
        let evicted = self.put(key, value.clone());
        Ok((value, evicted))
    }

    /// Remove an entry, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().shift_remove(key)
    }

    /// The number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured bound.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Snapshot of the cached keys, oldest first.
    pub fn keys(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_miss() {
        let cache: PoolCache<String, i32> = PoolCache::new(4);
        assert!(cache.get(&"a".to_string()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_and_get() {
        let cache = PoolCache::new(4);
        assert!(cache.put("a".to_string(), 1).is_none());
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_exactly_the_oldest() {
        let cache = PoolCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);

        let evicted = cache.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("a".to_string(), 1)));
        assert_eq!(cache.keys(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_read_refreshes_recency() {
        let cache = PoolCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);

        // touch "a" so "b" becomes the eviction victim
        cache.get(&"a".to_string());
        let evicted = cache.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
    }

    #[test]
    fn test_write_refreshes_recency() {
        let cache = PoolCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("a".to_string(), 10);

        let evicted = cache.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert_eq!(cache.get(&"a".to_string()), Some(10));
    }

    #[test]
    fn test_acquire_builds_once() {
        let cache: PoolCache<String, i32> = PoolCache::new(4);
        let calls = AtomicUsize::new(0);

        let (value, _) = cache
            .acquire("a".to_string(), || -> Result<i32, ()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);

        let (value, _) = cache
            .acquire("a".to_string(), || -> Result<i32, ()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(8)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acquire_propagates_factory_error() {
        let cache: PoolCache<String, i32> = PoolCache::new(4);
        let result = cache.acquire("a".to_string(), || Err("nope"));
        assert_eq!(result.unwrap_err(), "nope");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_acquire_races_build_once() {
        let cache: Arc<PoolCache<String, i32>> = Arc::new(PoolCache::new(4));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    let (value, _) = cache
                        .acquire("a".to_string(), || -> Result<i32, ()> {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // widen the race window
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(42)
                        })
                        .unwrap();
                    value
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove() {
        let cache = PoolCache::new(4);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.remove(&"a".to_string()), Some(1));
        assert!(cache.get(&"a".to_string()).is_none());
    }
}
