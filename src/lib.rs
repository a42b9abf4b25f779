/*!
An in-process, thread-safe, expirable key-value cache.

[`Cache`] couples a keyed lookup structure with a recency-ordered list so it
can cap its size under either of two eviction disciplines ([`Mode::Lrc`],
the default, or [`Mode::Lru`]), while every entry separately carries its own
TTL. Expiry is lazy: a `get`/`peek` on an expired entry reads as absent, but
the entry isn't actually dropped until an incoming `set` opportunistically
trims the oldest entry, until [`Cache::delete_expired`] is called, or until
[`Cache::purge`]. There is no background sweeper thread; a caller wanting
strict liveness should call `delete_expired` on its own timer, roughly every
`ttl / 2`.

```
use std::time::Duration;
use recency_cache::Cache;

let cache = Cache::new()
    .with_ttl(Duration::from_secs(60))
    .with_max_keys(1_000)
    .with_lru();

cache.set("a".to_string(), 1, Duration::ZERO);
assert_eq!(Some(1), cache.get(&"a".to_string()));
```
*/

mod cache;
mod compat;
mod entry;
mod stats;

pub use cache::{Cache, Mode, NO_EVICTION_TTL};
pub use compat::CacheCapability;
pub use stats::Stats;
