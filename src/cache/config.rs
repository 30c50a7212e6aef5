//! Cache configuration.

use std::time::Duration;

/// Configuration for an [`super::ExpiringCache`] instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default time-to-live for entries inserted without an explicit TTL.
    pub default_ttl: Duration,

    /// Maximum number of entries before cleanup kicks in.
    /// Cleanup first purges expired entries; if the cache is still over
    /// the limit, the oldest entries are evicted down to half of it.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300), // 5 minutes
            max_entries: 1_000,
        }
    }
}

impl CacheConfig {
    /// Set the default TTL (builder pattern).
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the entry limit (builder pattern).
    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Config for per-tick hot lookups: short TTL, generous capacity.
    pub fn hot_path() -> Self {
        Self {
            default_ttl: Duration::from_secs(5),
            max_entries: 10_000,
        }
    }

    /// Config for config-value lookups: medium TTL, invalidated on change.
    pub fn config_lookup() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 2_000,
        }
    }
}
