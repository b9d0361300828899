//! Concurrent keyed store backing every session cache

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

/// Store statistics for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub replacements: u64,
    pub entries: u64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    inserts: u64,
    replacements: u64,
}

/// Thread-safe map with independent `get`/`insert` operations.
///
/// # Concurrency contract
///
/// Each call takes the internal lock only for the duration of that call;
/// no lock is held across calls and no operation spans several keys.
/// A read-check-construct-insert sequence built from these calls is
/// therefore not atomic: the last `insert` for a key wins.
///
/// Entries never expire and are never evicted. `insert` on an existing
/// key replaces the previous value.
pub struct SharedStore<K, V> {
    name: &'static str,
    entries: Arc<RwLock<HashMap<K, V>>>,
    counters: Arc<RwLock<Counters>>,
}

impl<K, V> Clone for SharedStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            entries: Arc::clone(&self.entries),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<K, V> std::fmt::Debug for SharedStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("name", &self.name)
            .field("entry_count", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl<K, V> SharedStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(Counters::default())),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Look up a value, counting the hit or miss
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.entries.read().get(key).cloned();

        let mut counters = self.counters.write();
        if value.is_some() {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        drop(counters);

        #[cfg(feature = "metrics")]
        if value.is_some() {
            crate::observability::record_cache_hit(self.name);
        } else {
            crate::observability::record_cache_miss(self.name);
        }

        value
    }

    /// Store a value, returning the one it replaced
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key, value);
        #[cfg(feature = "metrics")]
        let len = entries.len();
        drop(entries);

        let mut counters = self.counters.write();
        counters.inserts += 1;
        if previous.is_some() {
            counters.replacements += 1;
        }
        drop(counters);

        #[cfg(feature = "metrics")]
        crate::observability::set_cache_size(self.name, len);

        previous
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let entries = self.len() as u64;
        let counters = self.counters.read();
        StoreStats {
            hits: counters.hits,
            misses: counters.misses,
            inserts: counters.inserts,
            replacements: counters.replacements,
            entries,
        }
    }
}
