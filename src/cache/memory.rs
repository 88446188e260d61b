//! In-process cache backed by DashMap, with per-entry TTL and a size bound

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{CacheError, CacheStats, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent in-memory [`CacheStore`]
#[derive(Debug)]
pub struct MemoryCache {
    values: DashMap<String, Entry>,
    sets: DashMap<String, HashSet<String>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    offline: AtomicBool,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            values: DashMap::new(),
            sets: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails until brought back online
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn available(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache is offline".into()));
        }
        Ok(())
    }

    /// Remove `keys` from every set so tag sets never outgrow the values
    fn forget(&self, keys: &HashSet<String>) {
        if keys.is_empty() {
            return;
        }
        self.sets
            .iter_mut()
            .for_each(|mut set| set.retain(|member| !keys.contains(member)));
    }

    /// Drop expired entries, then the soonest-to-expire until under the bound
    fn maybe_evict(&self) {
        if self.values.len() <= self.max_entries {
            return;
        }
        let mut dropped = HashSet::new();
        self.values.retain(|key, e| {
            if e.is_expired() {
                dropped.insert(key.clone());
                false
            } else {
                true
            }
        });

        let excess = self.values.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_expiry: Vec<(String, Instant)> = self
                .values
                .iter()
                .map(|e| (e.key().clone(), e.value().expires_at))
                .collect();
            by_expiry.sort_by_key(|(_, at)| *at);
            for (key, _) in by_expiry.into_iter().take(excess) {
                if self.values.remove(&key).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    dropped.insert(key);
                }
            }
        }
        self.forget(&dropped);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.available()?;
        if let Some(entry) = self.values.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            if self.values.remove_if(key, |_, e| e.is_expired()).is_some() {
                self.forget(&HashSet::from([key.to_string()]));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.available()?;
        self.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        self.maybe_evict();
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        self.available()?;
        let mut removed = 0;
        let mut gone = HashSet::new();
        for key in keys {
            if self.values.remove(key).is_some() {
                removed += 1;
                gone.insert(key.clone());
            }
            if self.sets.remove(key).is_some() {
                removed += 1;
            }
        }
        self.forget(&gone);
        Ok(removed)
    }

    fn add_to_set(&self, key: &str, member: &str) -> Result<(), CacheError> {
        self.available()?;
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.available()?;
        Ok(self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn ping(&self) -> Result<(), CacheError> {
        self.available()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.values.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_delete() {
        let cache = MemoryCache::new(10);
        cache.set_ex("a", "1", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(cache.delete(&["a".to_string()]).unwrap(), 1);
        assert_eq!(cache.get("a").unwrap(), None);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::new(10);
        cache.set_ex("a", "1", Duration::from_millis(0)).unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn test_bounded_size_evicts_soonest_expiring() {
        let cache = MemoryCache::new(2);
        cache.set_ex("short", "1", Duration::from_secs(1)).unwrap();
        cache.set_ex("long", "2", Duration::from_secs(600)).unwrap();
        cache.set_ex("longer", "3", Duration::from_secs(900)).unwrap();
        assert_eq!(cache.get("short").unwrap(), None);
        assert!(cache.get("long").unwrap().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_expired_members_leave_their_sets() {
        let cache = MemoryCache::new(10);
        for i in 0..5000 {
            let key = format!("search:{i}");
            cache.add_to_set("tag", &key).unwrap();
            cache.set_ex(&key, "v", Duration::ZERO).unwrap();
        }
        assert!(cache.set_members("tag").unwrap().len() <= 11);

        cache.add_to_set("tag", "search:last").unwrap();
        cache.set_ex("search:last", "v", Duration::ZERO).unwrap();
        assert_eq!(cache.get("search:last").unwrap(), None);
        assert!(!cache.set_members("tag").unwrap().contains(&"search:last".to_string()));
    }

    #[test]
    fn test_deleted_value_leaves_other_sets() {
        let cache = MemoryCache::new(10);
        cache.add_to_set("tag:a", "k").unwrap();
        cache.add_to_set("tag:b", "k").unwrap();
        cache.set_ex("k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.delete(&["k".to_string(), "tag:a".to_string()]).unwrap(), 2);
        assert!(cache.set_members("tag:b").unwrap().is_empty());
    }

    #[test]
    fn test_sets() {
        let cache = MemoryCache::new(10);
        cache.add_to_set("tag", "x").unwrap();
        cache.add_to_set("tag", "x").unwrap();
        cache.add_to_set("tag", "y").unwrap();
        let mut members = cache.set_members("tag").unwrap();
        members.sort();
        assert_eq!(members, vec!["x", "y"]);
        assert!(cache.set_members("none").unwrap().is_empty());
    }

    #[test]
    fn test_offline_fails_every_call() {
        let cache = MemoryCache::new(10);
        cache.set_offline(true);
        assert!(cache.ping().is_err());
        assert!(cache.get("a").is_err());
        cache.set_offline(false);
        assert!(cache.ping().is_ok());
    }
}
