//! Short-lived response cache for the list endpoints. Entries expire on a
//! TTL and are invalidated eagerly whenever a write touches the backing
//! collection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: String, value: Value) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry whose key starts with `prefix`. Called after
    /// writes so list responses never serve stale pages past the TTL.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_millis(10));
        cache.insert("bookings:1:20:all".to_string(), json!({"total": 3}));
        assert!(cache.get("bookings:1:20:all").is_some());

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("bookings:1:20:all").is_none());
    }

    #[test]
    fn prefix_invalidation_spares_other_namespaces() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("bookings:1:20:all".to_string(), json!(1));
        cache.insert("bookings:2:20:all".to_string(), json!(2));
        cache.insert("requests:1:20:all".to_string(), json!(3));

        cache.invalidate_prefix("bookings:");

        assert!(cache.get("bookings:1:20:all").is_none());
        assert!(cache.get("bookings:2:20:all").is_none());
        assert!(cache.get("requests:1:20:all").is_some());
    }
}
