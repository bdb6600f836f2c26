//! Immutable LRU snapshot
//!
//! A snapshot is an arena-backed doubly linked recency list plus a key index.
//! Slot 0 and slot 1 are the head and tail sentinels; entries live between
//! them ordered least-recently-used (after head) to most-recently-used
//! (before tail). Links are arena indices, so a snapshot is a plain value
//! with no shared mutable nodes.
//!
//! Derivations (`with_get`, `with_set`, ...) clone the arena and index and
//! mutate the private copy. The source snapshot is never touched, which is
//! what lets [`SnapCache`](crate::SnapCache) publish it to other threads.
//! Cost is O(capacity) per derived snapshot; keys are shared via `Arc<str>`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ahash::RandomState;

use crate::error::{Error, Result};
use crate::key::CanonicalKey;

const HEAD: usize = 0;
const TAIL: usize = 1;

#[derive(Clone)]
struct Entry<V> {
    key: Arc<str>,
    value: V,
}

/// Arena slot; `entry` is `None` for sentinels and free slots
#[derive(Clone)]
struct Node<V> {
    entry: Option<Entry<V>>,
    prev: usize,
    next: usize,
}

/// Result of a derivation that may leave the snapshot as it was
pub(crate) enum Change<V> {
    Unchanged,
    Replaced(Snapshot<V>),
}

impl<V> Change<V> {
    /// Snapshot to publish, if any
    pub(crate) fn into_replacement(self) -> Option<Snapshot<V>> {
        match self {
            Change::Unchanged => None,
            Change::Replaced(next) => Some(next),
        }
    }
}

/// What a `set` did to the resident key set
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SetOutcome {
    Inserted,
    Updated,
    /// Inserted after evicting the carried key
    Evicted(Arc<str>),
}

/// Point-in-time LRU state
#[derive(Clone)]
pub struct Snapshot<V> {
    nodes: Vec<Node<V>>,
    index: HashMap<Arc<str>, usize, RandomState>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<V: Clone> Snapshot<V> {
    /// Empty snapshot; capacity is validated by the caller
    pub(crate) fn new(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity + 2);
        nodes.push(Node {
            entry: None,
            prev: HEAD,
            next: TAIL,
        });
        nodes.push(Node {
            entry: None,
            prev: HEAD,
            next: TAIL,
        });

        Self {
            nodes,
            index: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Look up `key`, moving it to the most-recently-used end.
    ///
    /// A miss, or a hit on the entry that is already most recent, yields
    /// [`Change::Unchanged`].
    pub(crate) fn with_get(&self, key: &str) -> (Change<V>, Option<V>) {
        let Some(&idx) = self.index.get(key) else {
            return (Change::Unchanged, None);
        };
        let Some(value) = self.nodes[idx].entry.as_ref().map(|e| e.value.clone()) else {
            return (Change::Unchanged, None);
        };

        if self.nodes[idx].next == TAIL {
            return (Change::Unchanged, Some(value));
        }

        let mut next = self.clone();
        next.move_to_back(idx);
        (Change::Replaced(next), Some(value))
    }

    /// Insert or overwrite `key`, evicting the least recent entry when full
    pub(crate) fn with_set(&self, key: &str, value: V) -> (Snapshot<V>, SetOutcome) {
        let mut next = self.clone();
        let outcome = next.put(key, value);
        (next, outcome)
    }

    /// Drop `key` if resident
    pub(crate) fn with_remove(&self, key: &str) -> (Change<V>, Option<V>) {
        if !self.index.contains_key(key) {
            return (Change::Unchanged, None);
        }

        let mut next = self.clone();
        let removed = next.take(key);
        (Change::Replaced(next), removed)
    }

    /// Empty snapshot with the same capacity
    pub(crate) fn cleared(&self) -> Snapshot<V> {
        Snapshot::new(self.capacity)
    }

    fn put(&mut self, key: &str, value: V) -> SetOutcome {
        if let Some(&idx) = self.index.get(key) {
            if let Some(entry) = self.nodes[idx].entry.as_mut() {
                entry.value = value;
            }
            self.move_to_back(idx);
            return SetOutcome::Updated;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        let key: Arc<str> = Arc::from(key);
        let idx = self.alloc_node(Entry {
            key: Arc::clone(&key),
            value,
        });
        self.link_back(idx);
        self.index.insert(key, idx);

        match evicted {
            Some(old) => SetOutcome::Evicted(old),
            None => SetOutcome::Inserted,
        }
    }

    fn take(&mut self, key: &str) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        self.free_list.push(idx);
        self.nodes[idx].entry.take().map(|e| e.value)
    }

    fn evict(&mut self) -> Option<Arc<str>> {
        let idx = self.nodes[HEAD].next;
        if idx == TAIL {
            return None;
        }

        self.unlink(idx);
        self.free_list.push(idx);
        let entry = self.nodes[idx].entry.take()?;
        self.index.remove(&entry.key);
        Some(entry.key)
    }

    fn alloc_node(&mut self, entry: Entry<V>) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx].entry = Some(entry);
            idx
        } else {
            self.nodes.push(Node {
                entry: Some(entry),
                prev: HEAD,
                next: TAIL,
            });
            self.nodes.len() - 1
        }
    }

    fn move_to_back(&mut self, idx: usize) {
        if self.nodes[idx].next == TAIL {
            return; // Already most recent
        }
        self.unlink(idx);
        self.link_back(idx);
    }

    fn link_back(&mut self, idx: usize) {
        let prev = self.nodes[TAIL].prev;
        self.nodes[idx].prev = prev;
        self.nodes[idx].next = TAIL;
        self.nodes[prev].next = idx;
        self.nodes[TAIL].prev = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }
}

impl<V> Snapshot<V> {
    /// Maximum number of resident keys
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if no key is resident
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check if `key` is resident
    pub fn contains<K: CanonicalKey + ?Sized>(&self, key: &K) -> bool {
        self.index.contains_key(key.canonical_key().as_str())
    }

    /// Read a value without affecting recency
    pub fn peek<K: CanonicalKey + ?Sized>(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key.canonical_key().as_str())?;
        self.nodes[idx].entry.as_ref().map(|e| &e.value)
    }

    /// Iterate `(canonical key, value)` from least to most recently used
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.nodes[HEAD].next,
            remaining: self.index.len(),
        }
    }

    /// Canonical keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Verify that the index and the recency list describe the same entries
    pub fn check_invariants(&self) -> Result<()> {
        if self.index.len() > self.capacity {
            return Err(Error::Invariant(format!(
                "{} keys resident with capacity {}",
                self.index.len(),
                self.capacity
            )));
        }

        let mut prev = HEAD;
        let mut cursor = self.nodes[HEAD].next;
        let mut seen = 0usize;

        while cursor != TAIL {
            if cursor == HEAD || seen > self.index.len() {
                return Err(Error::Invariant("recency list is cyclic".to_string()));
            }
            let node = &self.nodes[cursor];
            if node.prev != prev {
                return Err(Error::Invariant(format!("broken back link at slot {}", cursor)));
            }
            let Some(entry) = node.entry.as_ref() else {
                return Err(Error::Invariant(format!("empty slot {} is linked", cursor)));
            };
            if self.index.get(&entry.key) != Some(&cursor) {
                return Err(Error::Invariant(format!("key {:?} is not indexed", entry.key)));
            }
            seen += 1;
            prev = cursor;
            cursor = node.next;
        }

        if self.nodes[TAIL].prev != prev {
            return Err(Error::Invariant("tail sentinel back link is stale".to_string()));
        }
        if seen != self.index.len() {
            return Err(Error::Invariant(format!(
                "{} entries linked but {} indexed",
                seen,
                self.index.len()
            )));
        }
        Ok(())
    }
}

impl<V: fmt::Debug> fmt::Debug for Snapshot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over a snapshot in recency order
pub struct Iter<'a, V> {
    nodes: &'a [Node<V>],
    cursor: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL || self.remaining == 0 {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining -= 1;
        node.entry.as_ref().map(|e| (&*e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
