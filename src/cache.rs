use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A bounded map with per-entry time-to-live eviction.
///
/// Expiry is enforced on read: a stale entry is treated as a miss and
/// removed, never returned. When the cache is full, expired entries are
/// purged first; if none are expired the oldest insertion is dropped, so
/// the cache never grows past its capacity.
pub struct TtlCache<K, V> {
    inner: Mutex<HashMap<K, Entry<V>>>,
    capacity: usize,
    ttl: Duration,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Look up a key, treating expired entries as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut map = self.inner.lock().expect("cache lock poisoned");
        match map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert with the cache's default time-to-live.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Insert with an entry-specific time-to-live, e.g. bounded by an
    /// upstream expiry. TTLs longer than the cache default are clamped.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let ttl = ttl.min(self.ttl);
        let now = Instant::now();
        let mut map = self.inner.lock().expect("cache lock poisoned");

        if map.len() >= self.capacity && !map.contains_key(&key) {
            map.retain(|_, e| e.expires_at > now);
            if map.len() >= self.capacity {
                // Still full: drop the oldest insertion.
                if let Some(oldest) = map
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone())
                {
                    map.remove(&oldest);
                }
            }
        }

        map.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Look up a key, computing and caching the value on a miss.
    ///
    /// The lock is not held across the computation, so concurrent misses
    /// on the same key may compute twice; last write wins, which is fine
    /// for immutable mappings.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_then_expiry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_millis(20));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a"), None, "stale entry must read as a miss");
    }

    #[test]
    fn test_capacity_bound() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.len(), 2, "cache must never exceed capacity");
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn test_entry_ttl_clamped_to_default() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_millis(10));
        cache.insert_with_ttl("a", 1, Duration::from_secs(3600));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a"), None);
    }

    #[tokio::test]
    async fn test_get_or_compute_caches() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_secs(60));
        let v: Result<u32, std::convert::Infallible> =
            cache.get_or_compute("k", || async { Ok(7) }).await;
        assert_eq!(v.unwrap(), 7);

        // Second call must not recompute.
        let v: Result<u32, std::convert::Infallible> = cache
            .get_or_compute("k", || async { panic!("should have hit the cache") })
            .await;
        assert_eq!(v.unwrap(), 7);
    }
}
