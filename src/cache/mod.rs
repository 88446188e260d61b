//! Search-response caching
//!
//! [`CacheStore`] is the key-value seam (string values with TTL, string sets).
//! [`SearchCache`] sits on top of it: entries live under `search:<sha256>` and
//! every entry is also recorded in one `search-tag:<kind>` set per record kind
//! it covers, so a write to that kind can drop exactly the affected entries.
//! Each kind also carries a generation counter that every invalidation bumps.
//! Keys hash the generations current when the read began, so a response
//! computed before a write can never be served after it.
//!
//! Cache failures never fail a request. They are logged and the caller
//! proceeds uncached.

pub mod memory;

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::config::CacheConfig;
use crate::core::identity::RecordKind;

pub use memory::MemoryCache;

pub const KEY_PREFIX: &str = "search:";
pub const TAG_PREFIX: &str = "search-tag:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache key could not be computed: {0}")]
    Key(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Minimal key-value store surface the search cache needs
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    /// Remove keys (values or sets); returns how many existed
    fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;
    fn add_to_set(&self, key: &str, member: &str) -> Result<(), CacheError>;
    fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;
    fn ping(&self) -> Result<(), CacheError>;
    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Tag set holding every search key that covered `kind`
pub fn tag_key(kind: RecordKind) -> String {
    format!("{}{}", TAG_PREFIX, kind.as_str())
}

/// `search:<hex sha256 of the query's JSON form>`
pub fn search_key<Q: Serialize>(query: &Q) -> Result<String, CacheError> {
    let canonical = serde_json::to_vec(query)?;
    let digest = Sha256::digest(&canonical);
    Ok(format!("{}{:x}", KEY_PREFIX, digest))
}

/// A search key bound to the kind generations it was computed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    key: String,
    generations: Vec<(RecordKind, u64)>,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

/// Tag-invalidated cache of serialized search responses
#[derive(Debug, Clone)]
pub struct SearchCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    generations: Arc<DashMap<RecordKind, u64>>,
}

impl SearchCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
            generations: Arc::new(DashMap::new()),
        }
    }

    /// From configuration: an in-memory store, or no cache when disabled
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self::new(Arc::new(MemoryCache::new(config.max_entries)), config.ttl())
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
            generations: Arc::new(DashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    fn generations_of(&self, kinds: &[RecordKind]) -> Vec<(RecordKind, u64)> {
        kinds
            .iter()
            .map(|kind| (*kind, self.generations.get(kind).map_or(0, |g| *g)))
            .collect()
    }

    /// Key for `query` over `kinds` at the current generations. Take it
    /// before reading the database.
    pub fn key_for<Q: Serialize>(
        &self,
        query: &Q,
        kinds: &[RecordKind],
    ) -> Result<CacheKey, CacheError> {
        let generations = self.generations_of(kinds);
        let key = search_key(&(query, &generations))?;
        Ok(CacheKey { key, generations })
    }

    /// Cached response for `key`, if present and the cache is reachable
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let store = self.store.as_ref()?;
        let key = key.as_str();
        match store.get(key) {
            Ok(Some(hit)) => {
                tracing::debug!(key, "search cache hit");
                Some(hit)
            }
            Ok(None) => {
                tracing::debug!(key, "search cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "search cache unavailable; serving uncached");
                None
            }
        }
    }

    /// Store `value` under `key` and tag it with each kind it covers.
    ///
    /// Skipped when any of those kinds was invalidated since `key` was taken.
    pub fn put(&self, key: &CacheKey, value: &str, kinds: &[RecordKind]) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if self.generations_of(kinds) != key.generations {
            tracing::debug!(key = key.as_str(), "search response outdated by a write; not cached");
            return;
        }
        let key = key.as_str();
        let result = (|| {
            // Tag first so an invalidation racing this put cannot miss the key
            for kind in kinds {
                store.add_to_set(&tag_key(*kind), key)?;
            }
            store.set_ex(key, value, self.ttl)
        })();
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not store search response");
        }
    }

    /// Drop every entry tagged with any of `kinds`; returns entries removed
    pub fn invalidate(&self, kinds: &[RecordKind]) -> usize {
        for kind in kinds {
            *self.generations.entry(*kind).or_insert(0) += 1;
        }
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let mut removed = 0;
        for kind in kinds {
            let tag = tag_key(*kind);
            let result = store.set_members(&tag).and_then(|mut keys| {
                keys.push(tag.clone());
                store.delete(&keys)
            });
            match result {
                // The tag set itself counts as one deleted key when present
                Ok(n) => removed += n.saturating_sub(1),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "search cache invalidation failed")
                }
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "invalidated search cache entries");
        }
        removed
    }

    pub fn ping(&self) -> Result<(), CacheError> {
        match self.store.as_ref() {
            Some(store) => store.ping(),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.store
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Q<'a> {
        query: &'a str,
        limit: i64,
    }

    fn cache() -> (Arc<MemoryCache>, SearchCache) {
        let store = Arc::new(MemoryCache::new(100));
        let cache = SearchCache::new(store.clone(), Duration::from_secs(60));
        (store, cache)
    }

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = search_key(&Q { query: "auth", limit: 10 }).unwrap();
        let b = search_key(&Q { query: "auth", limit: 10 }).unwrap();
        let c = search_key(&Q { query: "auth", limit: 11 }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("search:"));
        assert_eq!(a.len(), "search:".len() + 64);
    }

    fn key(cache: &SearchCache, query: &str, kinds: &[RecordKind]) -> CacheKey {
        cache.key_for(&Q { query, limit: 10 }, kinds).unwrap()
    }

    #[test]
    fn test_hit_is_bytewise_equal() {
        let (_, cache) = cache();
        let k = key(&cache, "auth", &[RecordKind::Epic]);
        cache.put(&k, "{\"data\":[1,2]}", &[RecordKind::Epic]);
        assert_eq!(cache.get(&k).as_deref(), Some("{\"data\":[1,2]}"));
    }

    #[test]
    fn test_invalidate_by_tag() {
        let (_, cache) = cache();
        let epics = key(&cache, "epics", &[RecordKind::Epic]);
        let both = key(&cache, "both", &[RecordKind::Epic, RecordKind::Comment]);
        let comments = key(&cache, "comments", &[RecordKind::Comment]);
        cache.put(&epics, "1", &[RecordKind::Epic]);
        cache.put(&both, "2", &[RecordKind::Epic, RecordKind::Comment]);
        cache.put(&comments, "3", &[RecordKind::Comment]);

        assert_eq!(cache.invalidate(&[RecordKind::Epic]), 2);
        assert!(cache.get(&epics).is_none());
        assert!(cache.get(&both).is_none());
        assert!(cache.get(&comments).is_some());
    }

    #[test]
    fn test_invalidation_changes_keys_of_affected_kinds_only() {
        let (_, cache) = cache();
        let epics = key(&cache, "auth", &[RecordKind::Epic]);
        let comments = key(&cache, "auth", &[RecordKind::Comment]);
        cache.invalidate(&[RecordKind::Epic]);
        assert_ne!(key(&cache, "auth", &[RecordKind::Epic]), epics);
        assert_eq!(key(&cache, "auth", &[RecordKind::Comment]), comments);
    }

    #[test]
    fn test_response_computed_before_a_write_is_never_served() {
        let (store, cache) = cache();
        let before = key(&cache, "auth", &[RecordKind::Epic]);
        // A write lands while the stale response is still being computed
        cache.invalidate(&[RecordKind::Epic]);
        cache.put(&before, "stale", &[RecordKind::Epic]);

        assert_eq!(store.stats().entries, 0);
        let after = key(&cache, "auth", &[RecordKind::Epic]);
        assert!(cache.get(&after).is_none());
        cache.put(&after, "fresh", &[RecordKind::Epic]);
        assert_eq!(cache.get(&after).as_deref(), Some("fresh"));
    }

    #[test]
    fn test_outage_degrades_to_uncached() {
        let (store, cache) = cache();
        store.set_offline(true);
        let k = key(&cache, "auth", &[RecordKind::Epic]);
        cache.put(&k, "v", &[RecordKind::Epic]);
        assert!(cache.get(&k).is_none());
        assert_eq!(cache.invalidate(&[RecordKind::Epic]), 0);
        assert!(cache.ping().is_err());
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let cache = SearchCache::disabled();
        let k = key(&cache, "auth", &[RecordKind::Epic]);
        cache.put(&k, "v", &[RecordKind::Epic]);
        assert!(cache.get(&k).is_none());
        assert!(cache.ping().is_ok());
    }
}
