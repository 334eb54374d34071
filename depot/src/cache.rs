//! In-process result cache with a time-to-live and explicit invalidation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct ResultCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, Arc<V>)>>,
}

impl<K: Eq + Hash, V> ResultCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value for `key`, unless it has expired.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get(key)
            .map(|(stored, value)| (stored.elapsed() < self.ttl, Arc::clone(value)));
        match entry {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries
            .lock()
            .insert(key, (Instant::now(), Arc::clone(&value)));
        value
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_until_invalidated() {
        let cache: ResultCache<u32, String> = ResultCache::new(Duration::from_secs(60));
        assert!(cache.get(&1).is_none());

        cache.insert(1, "one".to_string());
        cache.insert(2, "two".to_string());
        assert_eq!(cache.get(&1).as_deref().map(String::as_str), Some("one"));

        cache.invalidate();
        assert!(cache.get(&1).is_none());
        assert!(cache.get(&2).is_none());
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache: ResultCache<u32, u32> = ResultCache::new(Duration::ZERO);
        cache.insert(1, 1);
        assert!(cache.get(&1).is_none());
        // expired entries are evicted on lookup
        assert!(cache.entries.lock().is_empty());
    }
}
