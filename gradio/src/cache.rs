//! Two-level discovery cache primitives.
//!
//! Expiration is evaluated on read against the entry's creation time, so
//! frequent reads never extend an entry's lifetime. Expired entries remain
//! addressable through [`TtlCache::get_for_revalidation`] so their ETag can be
//! replayed as `If-None-Match`.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::hub::SpaceMetadata;
use crate::schema::ToolDescriptor;

pub type MetadataCache = TtlCache<SpaceMetadata>;
pub type SchemaCache = TtlCache<Vec<ToolDescriptor>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub etag_revalidations: u64,
}

struct Entry<V> {
    value: V,
    fetched_at: Instant,
    etag: Option<String>,
}

pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    etag_revalidations: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            etag_revalidations: AtomicU64::new(0),
        }
    }

    /// Fresh lookup. Expired entries count as misses but are retained for the
    /// revalidation path.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// TTL-bypassing lookup used to recover the ETag of an expired entry.
    /// Does not touch hit/miss statistics.
    pub fn get_for_revalidation(&self, key: &str) -> Option<(V, Option<String>)> {
        self.entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.etag.clone()))
    }

    /// Store an entry. The privacy invariant (never store private spaces) is
    /// enforced at the fetch call sites, not here.
    pub fn insert(&self, key: &str, value: V, etag: Option<String>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                fetched_at: Instant::now(),
                etag,
            },
        );
    }

    /// 304 path: restart the entry's TTL without replacing its value and count
    /// the revalidation. Returns false when the entry has vanished.
    pub fn refresh(&self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.fetched_at = Instant::now();
                self.etag_revalidations.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.etag_revalidations.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.len(),
            etag_revalidations: self.etag_revalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss_counting() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("a"), None);
        cache.insert("a", "v1".to_string(), None);
        assert_eq!(cache.get("a"), Some("v1".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_ttl_measured_from_creation() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(50));
        cache.insert("a", 7, None);
        // reads inside the window hit and must not extend the expiration
        assert_eq!(cache.get("a"), Some(7));
        assert_eq!(cache.get("a"), Some(7));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_expired_entry_available_for_revalidation() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(10));
        cache.insert("a", 7, Some("W1".to_string()));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
        let (value, etag) = cache.get_for_revalidation("a").unwrap();
        assert_eq!(value, 7);
        assert_eq!(etag.as_deref(), Some("W1"));
    }

    #[test]
    fn test_refresh_restarts_ttl_and_counts() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(40));
        cache.insert("a", 7, Some("W1".to_string()));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("a"), None);

        assert!(cache.refresh("a"));
        assert_eq!(cache.get("a"), Some(7));
        assert_eq!(cache.stats().etag_revalidations, 1);
        assert_eq!(cache.stats().size, 1);

        // repeated 304s are idempotent apart from the counter
        assert!(cache.refresh("a"));
        assert_eq!(cache.stats().etag_revalidations, 2);
        assert_eq!(cache.stats().size, 1);
        assert!(!cache.refresh("missing"));
    }

    #[test]
    fn test_overwrite_in_place() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1, None);
        cache.insert("a", 2, Some("W2".to_string()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_clear_resets_statistics() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1, None);
        cache.get("a");
        cache.get("b");
        cache.clear();

        assert_eq!(cache.get("a"), None);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        // one miss from the get after clear
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.etag_revalidations, 0);
    }
}
