//! Keystone - Shared data runtime for game-server modules
//!
//! One process-wide context giving every module hierarchical config with
//! hot reload, TTL caching, and per-player persistent data backed by
//! MySQL.
//!
//! ## Architecture
//!
//! - `settings` - Environment configuration
//! - `context` - The process-scoped [`Keystone`] runtime
//! - `config` - Access-controlled config registry with debounced YAML
//!   persistence and file-watch reload
//! - `cache` - TTL-based caching on DashMap
//! - `module` - Module registry and access tokens
//! - `player` - Per-player settings/storage with batched flushes
//! - `database` - MySQL pool, schema evolution, batch upserts
//! - `sched` - Debounce scheduler shared by saves and reloads
//!
//! ## Usage
//!
//! ```ignore
//! let runtime = Keystone::init(RuntimeConfig::from_env()).await?;
//! let token = runtime.register_module("ranks");
//! runtime.config_store().register(&token, "Points", "Kill", "Points per kill", 6i64, ConfigFlags::NONE)?;
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod module;
pub mod player;
pub mod sched;
pub mod settings;
pub mod value;

use tracing_subscriber::EnvFilter;

pub use cache::{CacheConfig, ExpiringCache};
pub use config::{ConfigFlags, ConfigStore, ConfigWatcher};
pub use context::Keystone;
pub use database::Database;
pub use error::{ConfigError, StoreError};
pub use module::{CORE_MODULE, ModuleRegistry, ModuleToken};
pub use player::{DataKind, Player, PlayerStore};
pub use settings::RuntimeConfig;
pub use value::{FromValue, Value};

/// Install a default tracing subscriber for hosts that do not bring their
/// own. If `RUST_LOG` is not set, defaults to "info" level for this crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keystone=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}
