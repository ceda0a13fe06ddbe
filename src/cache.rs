//! Advisory key/value cache fronting snapshot resolution.
//!
//! Entries are never the source of truth: a miss always falls through to
//! the authoritative store, and losing the cache only changes latency.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Pluggable cache. Individual `get`/`put` calls are atomic; entries are
/// keyed independently and carry no cross-key invariants.
pub trait ClientCache: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>);
}

struct CacheSlot {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

/// Embedded in-process cache, the default when none is configured.
pub struct MemoryCache {
    name: String,
    entries: DashMap<String, CacheSlot>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl MemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl ClientCache for MemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(slot) = self.entries.get(key) {
            match slot.expires_at {
                Some(deadline) if deadline <= Instant::now() => {}
                _ => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(slot.value.clone());
                }
            }
        }
        // Expired entries are dropped on the read path.
        self.entries
            .remove_if(key, |_, slot| match slot.expires_at {
                Some(deadline) => deadline <= Instant::now(),
                None => false,
            });
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        debug!(cache = %self.name, key = %key, "Cache put");
        self.entries.insert(
            key.to_string(),
            CacheSlot {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn miss_then_hit() {
        let cache = MemoryCache::new("svc");
        assert_eq!(cache.get("k"), None);
        cache.put("k", json!({"a": 1}), None);
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let cache = MemoryCache::new("svc");
        cache.put("k", json!(1), Some(Duration::from_millis(20)));
        assert_eq!(cache.get("k"), Some(json!(1)));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().entries, 0);
    }
}
