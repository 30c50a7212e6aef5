//! A single cache entry with creation and expiry timestamps.

use std::time::{Duration, Instant};

/// Value plus its lifetime bookkeeping.
///
/// Entries are never mutated in place; a refresh replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}
