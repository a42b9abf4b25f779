//! The cache engine: a keyed lookup structure coupled to a recency-ordered
//! list, with lazy TTL expiry and size-capped eviction.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::raw::RawTable;
use parking_lot::Mutex;

use crate::entry::{Entry, RecencyList};
use crate::stats::{render, Stats};

/// Sentinel default TTL ("no-eviction TTL"): effectively never expires.
/// Under it, the opportunistic back-trim during `set` is skipped.
pub const NO_EVICTION_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Eviction discipline applied when the cache is over its `max_keys` cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Least Recently Created: eviction by insertion order. Reads never reorder.
    Lrc,
    /// Least Recently Used: eviction by access order. A successful `get`
    /// promotes the entry to most-recent.
    Lru,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Lrc
    }
}

type OnEvicted<K, V> = dyn Fn(&K, &V) + Send + Sync;

fn saturating_expiry(now: Instant, ttl: Duration) -> Instant {
    if let Some(at) = now.checked_add(ttl) {
        return at;
    }
    let mut remaining = ttl;
    loop {
        remaining /= 2;
        if let Some(at) = now.checked_add(remaining) {
            return at;
        }
        if remaining.is_zero() {
            return now;
        }
    }
}

struct Inner<K, V> {
    table: RawTable<usize>,
    hash_builder: RandomState,
    list: RecencyList<Entry<K, V>>,
    mode: Mode,
    ttl: Duration,
    max_keys: usize,
    saw_custom_ttl: bool,
    on_evicted: Option<Arc<OnEvicted<K, V>>>,
    stats: Stats,
}

impl<K: Hash + Eq + Clone, V: Clone> Inner<K, V> {
    fn new() -> Self {
        Inner {
            table: RawTable::new(),
            hash_builder: RandomState::new(),
            list: RecencyList::with_capacity(0),
            mode: Mode::default(),
            ttl: NO_EVICTION_TTL,
            max_keys: 0,
            saw_custom_ttl: false,
            on_evicted: None,
            stats: Stats::default(),
        }
    }

    fn hash(&self, key: &K) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn rehash(list: &RecencyList<Entry<K, V>>, hash_builder: &RandomState, index: usize) -> u64 {
        let mut hasher = hash_builder.build_hasher();
        list.get(index).key.hash(&mut hasher);
        hasher.finish()
    }

    fn get_index(&self, hash: u64, key: &K) -> Option<usize> {
        self.table.get(hash, |&i| key == &self.list.get(i).key).copied()
    }

    fn insert_index(&mut self, hash: u64, index: usize) {
        let Self {
            ref mut table,
            ref list,
            ref hash_builder,
            ..
        } = *self;
        table.insert(hash, index, move |&i| Self::rehash(list, hash_builder, i));
    }

    /// The eviction primitive: unlink, deindex, count, and notify.
    /// Invoked under the engine lock for every removal path.
    fn evict_index(&mut self, index: usize) -> (K, V) {
        let hash = self.hash(&self.list.get(index).key);
        self.table.erase_entry(hash, |&i| i == index);
        let entry = self.list.remove(index);
        self.stats.evicted += 1;
        if let Some(cb) = &self.on_evicted {
            cb(&entry.key, &entry.value);
            tracing::trace!("evicted cache entry");
        }
        (entry.key, entry.value)
    }

    fn opportunistic_trim(&mut self, now: Instant) {
        if self.ttl == NO_EVICTION_TTL {
            return;
        }
        let back = self.list.back();
        if self.list.is_back_sentinel(back) {
            return;
        }
        if self.list.get(back).is_expired_at(now) {
            self.evict_index(back);
        }
    }

    fn enforce_size_cap(&mut self) {
        if self.max_keys > 0 && self.list.len() > self.max_keys {
            let back = self.list.back();
            self.evict_index(back);
        }
    }

    /// Returns whether this call's bookkeeping performed an eviction.
    fn set(&mut self, key: K, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let effective_ttl = if ttl.is_zero() { self.ttl } else { ttl };
        if !ttl.is_zero() {
            self.saw_custom_ttl = true;
        }
        let expires_at = saturating_expiry(now, effective_ttl);

        let hash = self.hash(&key);
        match self.get_index(hash, &key) {
            Some(index) => {
                let entry = self.list.get_mut(index);
                entry.value = value;
                entry.expires_at = expires_at;
                self.list.move_to_front(index);
            }
            None => {
                let index = self.list.push_front(Entry {
                    key: key.clone(),
                    value,
                    expires_at,
                });
                self.insert_index(hash, index);
                self.stats.added += 1;
            }
        }

        let before = self.stats.evicted;
        self.opportunistic_trim(now);
        self.enforce_size_cap();
        self.stats.evicted != before
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let hash = self.hash(key);
        let now = Instant::now();
        match self.get_index(hash, key) {
            Some(index) if !self.list.get(index).is_expired_at(now) => {
                self.stats.hits += 1;
                if self.mode == Mode::Lru {
                    self.list.move_to_front(index);
                }
                Some(self.list.get(index).value.clone())
            }
            _ => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn peek(&self, key: &K) -> Option<V> {
        let hash = self.hash(key);
        let now = Instant::now();
        match self.get_index(hash, key) {
            Some(index) if !self.list.get(index).is_expired_at(now) => {
                Some(self.list.get(index).value.clone())
            }
            _ => None,
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.get_index(self.hash(key), key).is_some()
    }

    fn get_oldest(&self) -> Option<(K, V)> {
        let back = self.list.back();
        if self.list.is_back_sentinel(back) {
            return None;
        }
        let entry = self.list.get(back);
        Some((entry.key.clone(), entry.value.clone()))
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.get_index(self.hash(key), key) {
            Some(index) => {
                self.evict_index(index);
                true
            }
            None => false,
        }
    }

    fn invalidate_fn<F: Fn(&K) -> bool>(&mut self, pred: F) -> usize {
        let matches: Vec<usize> = self
            .list
            .iter_front_to_back()
            .filter(|(_, entry)| pred(&entry.key))
            .map(|(i, _)| i)
            .collect();
        let count = matches.len();
        for index in matches {
            self.evict_index(index);
        }
        count
    }

    fn remove_oldest(&mut self) -> Option<(K, V)> {
        let back = self.list.back();
        if self.list.is_back_sentinel(back) {
            return None;
        }
        Some(self.evict_index(back))
    }

    fn resize(&mut self, max_keys: usize) -> usize {
        self.max_keys = max_keys;
        if max_keys == 0 {
            return 0;
        }
        let mut removed = 0;
        while self.list.len() > max_keys {
            let back = self.list.back();
            self.evict_index(back);
            removed += 1;
        }
        removed
    }

    fn delete_expired(&mut self) -> usize {
        let now = Instant::now();
        let fast_path = self.mode == Mode::Lrc && !self.saw_custom_ttl;
        let mut removed = 0;
        if fast_path {
            loop {
                let back = self.list.back();
                if self.list.is_back_sentinel(back) || !self.list.get(back).is_expired_at(now) {
                    break;
                }
                self.evict_index(back);
                removed += 1;
            }
        } else {
            let expired: Vec<usize> = self
                .list
                .iter_front_to_back()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(i, _)| i)
                .collect();
            for index in expired {
                self.evict_index(index);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "delete_expired swept entries");
        }
        removed
    }

    fn purge(&mut self) {
        let cb = self.on_evicted.clone();
        let mut removed = Vec::with_capacity(self.list.len());
        loop {
            let back = self.list.back();
            if self.list.is_back_sentinel(back) {
                break;
            }
            removed.push(self.list.remove(back));
        }
        self.table.clear();
        self.stats.evicted += removed.len() as u64;
        tracing::debug!(count = removed.len(), "purge cleared cache");
        if let Some(cb) = cb {
            for entry in &removed {
                cb(&entry.key, &entry.value);
            }
        }
    }

    fn keys(&self) -> Vec<K> {
        self.list.iter_back_to_front().map(|(_, e)| e.key.clone()).collect()
    }

    fn values(&self) -> Vec<V> {
        self.list
            .iter_back_to_front()
            .map(|(_, e)| e.value.clone())
            .collect()
    }
}

/// An in-process, thread-safe, expirable key-value cache.
///
/// Bounded by an optional `max_keys` entry cap enforced under either of two
/// recency disciplines ([`Mode::Lrc`] or [`Mode::Lru`]), with per-entry TTLs
/// that expire lazily: expired entries are reported as absent by `get`/`peek`
/// but are only actually removed by an incoming `set`'s opportunistic trim,
/// by [`Cache::delete_expired`], or by [`Cache::purge`].
///
/// A single [`parking_lot::Mutex`] guards the whole engine; every operation
/// is linearizable and O(1) except the `O(size)` bulk operations
/// (`keys`, `values`, `invalidate_fn`, `delete_expired`, `purge`).
pub struct Cache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Cache<K, V> {
    /// Builds a cache with the no-eviction default TTL, unlimited size, and
    /// LRC eviction. Chain `with_ttl`/`with_max_keys`/`with_lru`/`with_on_evicted`
    /// to configure it; there is no reconfiguration API once built.
    pub fn new() -> Self {
        tracing::trace!("constructing cache");
        Cache {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Sets the default TTL applied when a write passes a zero TTL.
    pub fn with_ttl(self, ttl: Duration) -> Self {
        self.inner.lock().ttl = ttl;
        self
    }

    /// Caps the cache at `n` entries (0 means unlimited, the default).
    pub fn with_max_keys(self, n: usize) -> Self {
        self.inner.lock().max_keys = n;
        self
    }

    /// Switches eviction from LRC (insertion order) to LRU (access order).
    pub fn with_lru(self) -> Self {
        self.inner.lock().mode = Mode::Lru;
        self
    }

    /// Registers a callback invoked, under the engine lock, for every entry
    /// removed for any reason. The callback must not call back into the
    /// cache: doing so deadlocks.
    pub fn with_on_evicted<F>(self, f: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner.lock().on_evicted = Some(Arc::new(f));
        self
    }

    /// Inserts or updates `key`. A zero `ttl` means "use the cache's default
    /// TTL". Updating an existing key refreshes its value and expiry and
    /// unconditionally promotes it to most-recent, in both eviction modes.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.inner.lock().set(key, value, ttl);
    }

    /// `set(key, value, Duration::ZERO)`. Returns whether this call evicted
    /// an entry as a side effect (opportunistic TTL trim or size-cap eviction).
    pub fn add(&self, key: K, value: V) -> bool {
        self.inner.lock().set(key, value, Duration::ZERO)
    }

    /// Returns the live value for `key`, updating hit/miss counters and, in
    /// LRU mode, promoting the entry. Absent or expired both read as `None`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }

    /// Like `get`, but never mutates recency order or statistics.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().peek(key)
    }

    /// Whether `key` is indexed, regardless of whether it has expired.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    /// If `key` is present, returns `(true, false)`. Otherwise inserts it
    /// (as `add` would) and returns `(false, evicted)`.
    pub fn contains_or_add(&self, key: K, value: V) -> (bool, bool) {
        let mut inner = self.inner.lock();
        if inner.contains(&key) {
            return (true, false);
        }
        let evicted = inner.set(key, value, Duration::ZERO);
        (false, evicted)
    }

    /// Removes `key` if present, firing the eviction callback.
    pub fn invalidate(&self, key: &K) {
        self.inner.lock().remove(key);
    }

    /// Removes `key` if present, returning whether anything was removed.
    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().remove(key)
    }

    /// Removes every entry whose key satisfies `pred`. `pred` must not
    /// mutate the cache. Returns the number of entries removed.
    pub fn invalidate_fn<F: Fn(&K) -> bool>(&self, pred: F) -> usize {
        self.inner.lock().invalidate_fn(pred)
    }

    /// Returns the back (oldest) entry without touching recency or stats.
    pub fn get_oldest(&self) -> Option<(K, V)> {
        self.inner.lock().get_oldest()
    }

    /// Removes the back (oldest) entry, returning it.
    pub fn remove_oldest(&self) -> Option<(K, V)> {
        self.inner.lock().remove_oldest()
    }

    /// Sets `max_keys = n` and evicts back entries until the cache fits.
    /// `n == 0` means unlimited and never evicts. Returns the number removed.
    pub fn resize(&self, n: usize) -> usize {
        self.inner.lock().resize(n)
    }

    /// Removes every entry whose `expires_at` is in the past. Returns the
    /// number removed.
    pub fn delete_expired(&self) -> usize {
        self.inner.lock().delete_expired()
    }

    /// Removes every entry, firing the eviction callback for each.
    pub fn purge(&self) {
        self.inner.lock().purge();
    }

    /// Current entry count, including any not-yet-expired-out entries.
    pub fn len(&self) -> usize {
        self.inner.lock().list.len()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from oldest to newest by current recency order. Not filtered
    /// for expiry.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().keys()
    }

    /// Values in the same order as `keys`. Not filtered for expiry.
    pub fn values(&self) -> Vec<V> {
        self.inner.lock().values()
    }

    /// A snapshot of the hit/miss/added/evicted counters.
    pub fn stat(&self) -> Stats {
        self.inner.lock().stats
    }
}

impl<K: Hash + Eq + Clone, V: Clone> std::fmt::Display for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        write!(f, "{}", render(inner.list.len(), &inner.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn lrc_keeps_oldest_by_insertion() {
        let cache = Cache::new().with_max_keys(2);
        cache.set("a".to_string(), "A".to_string(), Duration::ZERO);
        cache.set("b".to_string(), "B".to_string(), Duration::ZERO);
        cache.get(&"a".to_string());
        cache.set("c".to_string(), "C".to_string(), Duration::ZERO);
        assert_eq!(vec!["b".to_string(), "c".to_string()], cache.keys());
    }

    #[test]
    fn lru_keeps_oldest_by_access() {
        let cache = Cache::new().with_max_keys(2).with_lru();
        cache.set("a".to_string(), "A".to_string(), Duration::ZERO);
        cache.set("b".to_string(), "B".to_string(), Duration::ZERO);
        cache.get(&"a".to_string());
        cache.set("c".to_string(), "C".to_string(), Duration::ZERO);
        assert_eq!(vec!["a".to_string(), "c".to_string()], cache.keys());
    }

    #[test]
    fn lazy_expiry_reports_absent_but_keeps_len() {
        let cache = Cache::new().with_ttl(Duration::from_millis(5));
        cache.set("k".to_string(), "v".to_string(), Duration::ZERO);
        sleep(Duration::from_millis(10));
        assert_eq!(1, cache.len());
        assert_eq!(None, cache.get(&"k".to_string()));
        assert_eq!(1, cache.stat().misses);
        assert_eq!(1, cache.delete_expired());
        assert_eq!(0, cache.len());
    }

    #[test]
    fn size_cap_bounds_len_under_churn() {
        let cache = Cache::new().with_max_keys(10).with_ttl(Duration::from_secs(3600));
        for i in 0..100 {
            let key = format!("key{i}");
            cache.set(key.clone(), i, Duration::ZERO);
            cache.get(&key);
            assert!(cache.len() < 20);
        }
        assert_eq!(10, cache.len());
        let mut keys = cache.keys();
        keys.sort();
        let expected: Vec<String> = (90..100).map(|i| format!("key{i}")).collect();
        assert_eq!(expected, keys);
    }

    #[test]
    fn eviction_callback_accounts_every_removal() {
        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let cache = Cache::new()
            .with_ttl(Duration::from_millis(150))
            .with_on_evicted(move |k: &String, v: &String| {
                recorder.lock().push((k.clone(), v.clone()));
            });
        cache.set("key1".to_string(), "val1".to_string(), Duration::ZERO);
        sleep(Duration::from_millis(200));
        cache.delete_expired();
        assert_eq!(
            vec![("key1".to_string(), "val1".to_string())],
            seen.lock().clone()
        );

        cache.set("key2".to_string(), "val2".to_string(), Duration::ZERO);
        cache.purge();
        assert_eq!(
            vec![
                ("key1".to_string(), "val1".to_string()),
                ("key2".to_string(), "val2".to_string())
            ],
            seen.lock().clone()
        );
    }

    #[test]
    fn concurrent_writers_converge() {
        let cache = Arc::new(Cache::<String, i32>::new());
        let mut handles = Vec::new();
        for i in 0..1000 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                cache.set(format!("key-{}", i / 10), i, Duration::ZERO);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(100, cache.len());
    }

    #[test]
    fn string_rendering_matches_scenario() {
        let cache = Cache::new()
            .with_max_keys(3)
            .with_ttl(Duration::from_millis(10));
        cache.set("key1".to_string(), "val1".to_string(), Duration::ZERO);
        cache.get(&"key1".to_string());
        sleep(Duration::from_millis(11));
        cache.get(&"key1".to_string());
        cache.set(
            "key2".to_string(),
            "val2".to_string(),
            Duration::from_secs(300),
        );
        assert_eq!(
            "Size: 1, Stats: {Hits:1 Misses:1 Added:2 Evicted:1} (50.0%)",
            cache.to_string()
        );
    }

    #[test]
    fn zero_ttl_means_default_not_immediate_expiry() {
        let cache = Cache::new().with_ttl(Duration::from_secs(60));
        cache.set("a".to_string(), 1, Duration::ZERO);
        assert_eq!(Some(1), cache.get(&"a".to_string()));
    }

    #[test]
    fn resize_zero_is_unlimited_and_evicts_nothing() {
        let cache = Cache::new().with_max_keys(2);
        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.set("b".to_string(), 2, Duration::ZERO);
        assert_eq!(0, cache.resize(0));
        cache.set("c".to_string(), 3, Duration::ZERO);
        assert_eq!(3, cache.len());
    }

    #[test]
    fn empty_cache_remove_oldest_and_get_oldest_are_absent() {
        let cache: Cache<String, i32> = Cache::new();
        assert_eq!(None, cache.remove_oldest());
        assert_eq!(None, cache.get_oldest());
        assert_eq!(0, cache.stat().evicted);
    }

    #[test]
    fn added_minus_evicted_equals_len() {
        let cache = Cache::new().with_max_keys(3);
        for i in 0..10 {
            cache.set(i, i, Duration::ZERO);
        }
        let stat = cache.stat();
        assert_eq!(stat.added - stat.evicted, cache.len() as u64);
    }

    #[test]
    fn purge_is_idempotent() {
        let cache = Cache::new();
        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.purge();
        cache.purge();
        assert_eq!(0, cache.len());
    }

    #[test]
    fn invalidate_twice_matches_once() {
        let cache = Cache::new();
        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.invalidate(&"a".to_string());
        cache.invalidate(&"a".to_string());
        assert!(!cache.contains(&"a".to_string()));
    }

    #[test]
    fn invalidate_fn_removes_matching_keys() {
        let cache = Cache::new();
        for i in 0..5 {
            cache.set(i, i, Duration::ZERO);
        }
        let removed = cache.invalidate_fn(|k| k % 2 == 0);
        assert_eq!(3, removed);
        assert_eq!(2, cache.len());
    }

    #[test]
    fn peek_never_mutates_stats_or_order() {
        let cache = Cache::new().with_lru();
        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.set("b".to_string(), 2, Duration::ZERO);
        assert_eq!(Some(1), cache.peek(&"a".to_string()));
        assert_eq!(Stats::default(), cache.stat());
        assert_eq!(vec!["a".to_string(), "b".to_string()], cache.keys());
    }

    #[test]
    fn contains_or_add_is_atomic() {
        let cache = Cache::new().with_max_keys(1);
        assert_eq!((false, false), cache.contains_or_add("a".to_string(), 1));
        assert_eq!((true, false), cache.contains_or_add("a".to_string(), 2));
        assert_eq!((false, true), cache.contains_or_add("b".to_string(), 2));
    }
}
