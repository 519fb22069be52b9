//! Bounded least-recently-used cache.
//!
//! Each remote client owns one of these; caches are never shared between
//! clients or engines.

use indexmap::IndexMap;
use std::hash::Hash;

/// A fixed-capacity cache evicting the least recently used entry.
///
/// Entries are kept in recency order: the front of the map is the oldest.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    entries: IndexMap<K, V>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates an empty cache. A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let (key, value) = self.entries.shift_remove_entry(key)?;
        self.entries.insert(key, value);
        self.entries.last().map(|(_, value)| value)
    }

    /// Returns the first entry matching `predicate`, marking it most recently used.
    pub fn find<P>(&mut self, predicate: P) -> Option<&V>
    where
        P: Fn(&V) -> bool,
    {
        let key = self
            .entries
            .iter()
            .find(|(_, value)| predicate(value))
            .map(|(key, _)| key.clone())?;
        self.get(&key)
    }

    /// Inserts or replaces an entry, evicting the oldest one when full.
    pub fn put(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        self.entries.shift_remove(&key);
        self.entries.insert(key, value);
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    /// Removes an entry.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    /// Returns true if `key` is cached, without touching its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
