//! Hit/miss/add/evict accounting and the cache's `Display` rendering.

/// A snapshot of a cache's lifetime counters.
///
/// `added - evicted` always equals the cache's current length (`Purge`
/// counts every surviving entry as evicted).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of `Get` calls that found a live entry.
    pub hits: u64,
    /// Number of `Get` calls that found no live entry.
    pub misses: u64,
    /// Number of entries created (updates to an existing key don't count).
    pub added: u64,
    /// Number of entries destroyed, for any reason.
    pub evicted: u64,
}

impl Stats {
    pub(crate) fn hit_pct(&self) -> f64 {
        100.0 * self.hits as f64 / (self.hits + self.misses) as f64
    }
}

/// Renders as `Size: {len}, Stats: {Hits:{h} Misses:{m} Added:{a} Evicted:{e}} ({pct}%)`.
///
/// When no `Get` has ever been made, `hits + misses == 0` and the percentage
/// renders as the IEEE-754 string `NaN%`.
pub(crate) fn render(len: usize, stats: &Stats) -> String {
    format!(
        "Size: {}, Stats: {{Hits:{} Misses:{} Added:{} Evicted:{}}} ({:.1}%)",
        len,
        stats.hits,
        stats.misses,
        stats.added,
        stats.evicted,
        stats.hit_pct()
    )
}
