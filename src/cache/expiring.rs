//! Generic expiring map with size-bounded eviction.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::{CacheConfig, CacheEntry};

/// A thread-safe expiring cache.
///
/// Lookups never return stale values: an expired entry behaves exactly like
/// a missing one. Under a race, two callers may both invoke the factory for
/// the same key; factories are expected to be pure reads, so the duplicate
/// work is harmless and the last insert wins.
///
/// Cloning is cheap and shares the underlying map.
pub struct ExpiringCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    config: CacheConfig,
}

impl<K, V> Clone for ExpiringCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            config: self.config.clone(),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Get a live value, or compute and store one via `factory`.
    ///
    /// `ttl` overrides the cache's default TTL for this entry only.
    pub fn get_or_add<F>(&self, key: K, factory: F, ttl: Option<Duration>) -> V
    where
        F: FnOnce(&K) -> V,
    {
        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired() {
                return entry.value().value().clone();
            }
        }

        let value = factory(&key);
        let entry = CacheEntry::new(value.clone(), ttl.unwrap_or(self.config.default_ttl));
        self.entries.insert(key, entry);

        if self.entries.len() > self.config.max_entries {
            self.cleanup();
        }

        value
    }

    /// Get a live value if present. Never returns an expired entry.
    pub fn try_get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            None
        } else {
            Some(entry.value().value().clone())
        }
    }

    /// Insert or replace a value.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.config.default_ttl));
        self.entries.insert(key, entry);
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Remove all entries.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Remove every entry whose key matches the predicate.
    pub fn invalidate_where<F>(&self, predicate: F)
    where
        F: Fn(&K) -> bool,
    {
        self.entries.retain(|key, _| !predicate(key));
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Purge expired entries; if the cache is still over its limit, evict
    /// the oldest entries by creation time down to half the limit. The
    /// half-limit hysteresis keeps a burst of inserts from re-triggering
    /// cleanup on every call.
    pub fn cleanup(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());

        let over = self.entries.len().saturating_sub(self.config.max_entries);
        if over == 0 {
            return;
        }

        let mut by_age: Vec<(K, std::time::Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().created_at()))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);

        let evict = self.entries.len() - self.config.max_entries / 2;
        for (key, _) in by_age.into_iter().take(evict) {
            self.entries.remove(&key);
        }
    }
}

impl<K, V> std::fmt::Debug for ExpiringCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.config.max_entries)
            .finish()
    }
}
