//! Cache module - TTL-based caching for hot-path lookups.
//!
//! Modules use expiring caches to avoid repeated expensive lookups on the
//! tick path. Absence and expiry are represented in the return contract,
//! never as errors.
//!
//! ## Architecture
//!
//! - `ExpiringCache` - Generic expiring map with size-bounded eviction
//! - `CacheEntry` - Immutable value + creation/expiry timestamps
//! - `CacheConfig` - Per-cache tuning (default TTL, max entries)
//!
//! ## Usage
//!
//! ```ignore
//! let cache: ExpiringCache<String, i64> = ExpiringCache::new(CacheConfig::default());
//! let value = cache.get_or_add("points".to_string(), |_| expensive_lookup(), None);
//! ```

mod config;
mod entry;
mod expiring;

pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use expiring::ExpiringCache;
