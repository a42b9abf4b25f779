//! A capability-compatible adapter so [`Cache`] can substitute for a
//! third-party LRU cache exposing the
//! `{add, get, peek, contains, contains_or_add, remove, remove_oldest,
//! get_oldest, len, keys, values, purge, resize}` surface.
//!
//! Every method here is a one-line forward onto the engine; this trait adds
//! no state and no behavior of its own.

use std::hash::Hash;

use crate::Cache;

/// The capability set a drop-in LRU cache replacement is expected to expose.
pub trait CacheCapability<K, V> {
    /// Inserts `key` using the cache's default TTL. Returns whether an
    /// eviction occurred as a side effect.
    fn add(&self, key: K, value: V) -> bool;
    /// Returns the live value for `key`, if any.
    fn get(&self, key: &K) -> Option<V>;
    /// Like `get`, but never mutates recency order or statistics.
    fn peek(&self, key: &K) -> Option<V>;
    /// Whether `key` is indexed, regardless of expiry.
    fn contains(&self, key: &K) -> bool;
    /// Atomic "insert if absent": `(true, false)` if already present,
    /// otherwise `(false, evicted)`.
    fn contains_or_add(&self, key: K, value: V) -> (bool, bool);
    /// Removes `key` if present, returning whether anything was removed.
    fn remove(&self, key: &K) -> bool;
    /// Removes and returns the oldest entry.
    fn remove_oldest(&self) -> Option<(K, V)>;
    /// Returns the oldest entry without removing it.
    fn get_oldest(&self) -> Option<(K, V)>;
    /// Current entry count.
    fn len(&self) -> usize;
    /// Whether the cache currently holds no entries.
    fn is_empty(&self) -> bool;
    /// Keys from oldest to newest.
    fn keys(&self) -> Vec<K>;
    /// Values in the same order as `keys`.
    fn values(&self) -> Vec<V>;
    /// Removes every entry.
    fn purge(&self);
    /// Caps the cache at `n` entries, evicting down to fit. Returns the
    /// number removed.
    fn resize(&self, n: usize) -> usize;
}

impl<K: Hash + Eq + Clone, V: Clone> CacheCapability<K, V> for Cache<K, V> {
    fn add(&self, key: K, value: V) -> bool {
        Cache::add(self, key, value)
    }

    fn get(&self, key: &K) -> Option<V> {
        Cache::get(self, key)
    }

    fn peek(&self, key: &K) -> Option<V> {
        Cache::peek(self, key)
    }

    fn contains(&self, key: &K) -> bool {
        Cache::contains(self, key)
    }

    fn contains_or_add(&self, key: K, value: V) -> (bool, bool) {
        Cache::contains_or_add(self, key, value)
    }

    fn remove(&self, key: &K) -> bool {
        Cache::remove(self, key)
    }

    fn remove_oldest(&self) -> Option<(K, V)> {
        Cache::remove_oldest(self)
    }

    fn get_oldest(&self) -> Option<(K, V)> {
        Cache::get_oldest(self)
    }

    fn len(&self) -> usize {
        Cache::len(self)
    }

    fn is_empty(&self) -> bool {
        Cache::is_empty(self)
    }

    fn keys(&self) -> Vec<K> {
        Cache::keys(self)
    }

    fn values(&self) -> Vec<V> {
        Cache::values(self)
    }

    fn purge(&self) {
        Cache::purge(self)
    }

    fn resize(&self, n: usize) -> usize {
        Cache::resize(self, n)
    }
}
