//! SnapCache: lock-free LRU handle over published snapshots
//!
//! Every mutating operation reads the published snapshot, derives a new one
//! off to the side, and installs it with a single compare-and-swap. A lost
//! race rebuilds from whichever snapshot won, never from the stale base.
//! Superseded snapshots are reference counted and freed when the last reader
//! drops its `Arc`.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::key::CanonicalKey;
use crate::snapshot::{SetOutcome, Snapshot};
use crate::stats::CacheStats;

/// Concurrent fixed-capacity LRU cache
///
/// Share it by reference or behind an `Arc`; all operations take `&self`.
pub struct SnapCache<V> {
    /// Currently published snapshot
    current: ArcSwap<Snapshot<V>>,

    /// Cache statistics
    stats: CacheStats,

    /// Construction parameters
    config: CacheConfig,
}

impl<V: Clone> SnapCache<V> {
    /// Create a new cache with the given capacity
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of resident keys, at least 1
    ///
    /// # Returns
    /// * `Result<SnapCache<V>>` - `Error::InvalidCapacity` for a zero capacity
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(CacheConfig::new(capacity))
    }

    /// Create a new cache from a full configuration
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            capacity = config.capacity,
            retry_limit = ?config.retry_limit,
            "created snapshot cache"
        );

        Ok(Self {
            current: ArcSwap::from_pointee(Snapshot::new(config.capacity)),
            stats: CacheStats::new(),
            config,
        })
    }

    /// Get a value, making its key the most recently used
    ///
    /// # Returns
    /// * `Option<V>` - `None` if the key is not resident
    pub fn get<K: CanonicalKey + ?Sized>(&self, key: &K) -> Option<V> {
        let key = key.canonical_key();
        let value = self.commit(|base| {
            let (change, value) = base.with_get(&key);
            (change.into_replacement(), value)
        });
        self.record_lookup(value.is_some());
        value
    }

    /// Insert or overwrite a value, evicting the least recently used key
    /// when the cache is full
    pub fn set<K: CanonicalKey + ?Sized>(&self, key: &K, value: V) {
        let key = key.canonical_key();
        let outcome = self.commit(|base| {
            let (next, outcome) = base.with_set(&key, value.clone());
            (Some(next), outcome)
        });
        self.record_set(outcome);
    }

    /// [`get`](Self::get) that gives up after the configured retry limit
    pub fn try_get<K: CanonicalKey + ?Sized>(&self, key: &K) -> Result<Option<V>> {
        let key = key.canonical_key();
        let value = self.try_commit(|base| {
            let (change, value) = base.with_get(&key);
            (change.into_replacement(), value)
        })?;
        self.record_lookup(value.is_some());
        Ok(value)
    }

    /// [`set`](Self::set) that gives up after the configured retry limit
    ///
    /// On `Error::Contended` the cache is left exactly as if the call never
    /// happened.
    pub fn try_set<K: CanonicalKey + ?Sized>(&self, key: &K, value: V) -> Result<()> {
        let key = key.canonical_key();
        let outcome = self.try_commit(|base| {
            let (next, outcome) = base.with_set(&key, value.clone());
            (Some(next), outcome)
        })?;
        self.record_set(outcome);
        Ok(())
    }

    /// Remove a key, returning its value if it was resident
    pub fn remove<K: CanonicalKey + ?Sized>(&self, key: &K) -> Option<V> {
        let key = key.canonical_key();
        let removed = self.commit(|base| {
            let (change, removed) = base.with_remove(&key);
            (change.into_replacement(), removed)
        });
        if removed.is_some() {
            self.stats.record_removal();
        }
        removed
    }

    /// Drop every resident key (statistics are kept)
    pub fn clear(&self) {
        self.commit(|base| (Some(base.cleared()), ()));
    }

    /// Read a value without affecting recency
    pub fn peek<K: CanonicalKey + ?Sized>(&self, key: &K) -> Option<V> {
        self.current.load().peek(key).cloned()
    }

    /// Check if a key is resident
    pub fn contains<K: CanonicalKey + ?Sized>(&self, key: &K) -> bool {
        self.current.load().contains(key)
    }

    /// Derive-and-publish until a publish succeeds.
    ///
    /// `derive` returns the snapshot to publish (`None` leaves the published
    /// one in place) and the operation's result.
    fn commit<R, F>(&self, mut derive: F) -> R
    where
        F: FnMut(&Snapshot<V>) -> (Option<Snapshot<V>>, R),
    {
        let mut base = self.current.load_full();
        loop {
            let (candidate, result) = derive(base.as_ref());
            match self.publish(&base, candidate) {
                Ok(()) => return result,
                Err(latest) => base = latest,
            }
        }
    }

    fn try_commit<R, F>(&self, mut derive: F) -> Result<R>
    where
        F: FnMut(&Snapshot<V>) -> (Option<Snapshot<V>>, R),
    {
        let Some(limit) = self.config.retry_limit else {
            return Ok(self.commit(derive));
        };

        let mut base = self.current.load_full();
        for _ in 0..limit {
            let (candidate, result) = derive(base.as_ref());
            match self.publish(&base, candidate) {
                Ok(()) => return Ok(result),
                Err(latest) => base = latest,
            }
        }
        Err(Error::Contended { attempts: limit })
    }

    /// One compare-and-swap of `base` for `candidate`.
    ///
    /// On a lost race returns the snapshot that is published now.
    fn publish(
        &self,
        base: &Arc<Snapshot<V>>,
        candidate: Option<Snapshot<V>>,
    ) -> std::result::Result<(), Arc<Snapshot<V>>> {
        let Some(candidate) = candidate else {
            return Ok(());
        };

        let prev = self.current.compare_and_swap(base, Arc::new(candidate));
        if Arc::ptr_eq(&*prev, base) {
            return Ok(());
        }

        self.stats.record_contention();
        trace!("snapshot publish lost a race, rebuilding from latest");
        Err(Guard::into_inner(prev))
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
    }

    fn record_set(&self, outcome: SetOutcome) {
        match outcome {
            SetOutcome::Inserted => self.stats.record_insert(),
            SetOutcome::Updated => self.stats.record_update(),
            SetOutcome::Evicted(key) => {
                debug!(key = %key, "evicted least recently used entry");
                self.stats.record_insert();
                self.stats.record_eviction();
            }
        }
    }
}

impl<V> SnapCache<V> {
    /// Currently published snapshot
    ///
    /// The returned snapshot never changes, however long it is held.
    pub fn snapshot(&self) -> Arc<Snapshot<V>> {
        self.current.load_full()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current number of resident keys
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Check if no key is resident
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Get the construction parameters
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<V> fmt::Debug for SnapCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapCache")
            .field("capacity", &self.config.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[test]
    fn test_cache_trace() {
        let cache = SnapCache::new(2).unwrap();

        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));

        cache.set("c", 3); // Should evict b, a was just touched
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn test_cache_invalid_capacity() {
        let result = SnapCache::<u32>::new(0);
        assert_eq!(result.unwrap_err(), Error::InvalidCapacity(0));

        let result = SnapCache::<u32>::with_config(CacheConfig::new(4).with_retry_limit(0));
        assert_eq!(result.unwrap_err(), Error::InvalidRetryLimit(0));
    }

    #[test]
    fn test_cache_capacity_invariant() {
        let cache = SnapCache::new(5).unwrap();
        for i in 0..100u64 {
            cache.set(&i, i * 10);
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.stats().evictions(), 95);
        cache.snapshot().check_invariants().unwrap();
    }

    #[test]
    fn test_cache_evicts_first_touched() {
        let cache = SnapCache::new(3).unwrap();
        cache.set(&1, "v1");
        cache.set(&2, "v2");
        cache.set(&3, "v3");
        cache.set(&4, "v4");

        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn test_cache_touch_on_read() {
        let cache = SnapCache::new(3).unwrap();
        cache.set("k", 0);
        cache.set("x", 1);
        cache.set("y", 2);
        assert_eq!(cache.get("k"), Some(0));

        // k outlives every other resident key
        cache.set("n1", 3);
        assert!(cache.contains("k"));
        cache.set("n2", 4);
        assert!(cache.contains("k"));
        cache.set("n3", 5);
        assert!(!cache.contains("k"));
    }

    #[test]
    fn test_cache_overwrite() {
        let cache = SnapCache::new(2).unwrap();
        cache.set("k", "v1");
        cache.set("k", "v2");

        assert_eq!(cache.get("k"), Some("v2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().inserts(), 1);
        assert_eq!(cache.stats().updates(), 1);
    }

    #[test]
    fn test_cache_mixed_key_types() {
        let cache = SnapCache::new(4).unwrap();
        cache.set(&1i64, "int");
        assert_eq!(cache.get(&1.0f64), Some("int"));
        assert_eq!(cache.get("1"), Some("int"));
        assert_eq!(cache.get(&Key::Float(1.0)), Some("int"));

        cache.set(&Key::from(0.5), "half");
        assert_eq!(cache.get("0.5"), Some("half"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_peek_keeps_order() {
        let cache = SnapCache::new(2).unwrap();
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.peek("a"), Some(1));

        cache.set("c", 3); // a was only peeked, so it goes
        assert!(!cache.contains("a"));
        assert_eq!(cache.stats().hits(), 0);
    }

    #[test]
    fn test_cache_remove_and_clear() {
        let cache = SnapCache::new(4).unwrap();
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.remove("a"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().removals(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 4);
    }

    #[test]
    fn test_cache_held_snapshot_is_stable() {
        let cache = SnapCache::new(2).unwrap();
        cache.set("a", 1);
        let held = cache.snapshot();

        cache.set("a", 100);
        cache.set("b", 2);
        cache.set("c", 3);

        assert_eq!(held.peek("a"), Some(&1));
        assert_eq!(held.len(), 1);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_cache_miss_publishes_nothing() {
        let cache = SnapCache::new(2).unwrap();
        cache.set("a", 1);
        let before = cache.snapshot();

        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.get("a"), Some(1)); // Already most recent
        assert!(Arc::ptr_eq(&before, &cache.snapshot()));
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hits(), 1);
    }

    #[test]
    fn test_cache_retry_rebuilds_from_latest() {
        let cache = SnapCache::new(4).unwrap();
        cache.set("a", 1);

        // A competing writer publishes between read and swap twice
        let mut interfere = 2;
        let outcome = cache.commit(|base| {
            if interfere > 0 {
                interfere -= 1;
                let (next, _) = base.with_set(&format!("w{}", interfere), 0);
                cache.current.store(Arc::new(next));
            }
            let (next, outcome) = base.with_set("z", 26);
            (Some(next), outcome)
        });

        assert_eq!(outcome, SetOutcome::Inserted);
        assert_eq!(cache.stats().contention(), 2);
        // Nothing the competing writer published was lost
        assert!(cache.contains("w1"));
        assert!(cache.contains("w0"));
        assert_eq!(cache.peek("z"), Some(26));
        assert_eq!(cache.peek("a"), Some(1));
    }

    #[test]
    fn test_cache_bounded_retry_gives_up() {
        let config = CacheConfig::new(4).with_retry_limit(3);
        let cache = SnapCache::with_config(config).unwrap();
        cache.set("a", 1);

        let result = cache.try_commit(|base| {
            cache.current.store(Arc::new(base.clone()));
            let (next, outcome) = base.with_set("b", 2);
            (Some(next), outcome)
        });

        assert_eq!(result.unwrap_err(), Error::Contended { attempts: 3 });
        assert_eq!(cache.stats().contention(), 3);
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_cache_bounded_retry_uncontended() {
        let config = CacheConfig::new(2).with_retry_limit(1);
        let cache = SnapCache::with_config(config).unwrap();

        cache.try_set("a", 1).unwrap();
        assert_eq!(cache.try_get("a").unwrap(), Some(1));
        assert_eq!(cache.try_get("b").unwrap(), None);
        assert_eq!(cache.stats().contention(), 0);
    }
}
