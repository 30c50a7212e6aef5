//! Module registry - tracks the logical modules sharing the runtime.
//!
//! Each independently-developed module registers once at startup and
//! receives a [`ModuleToken`]: an explicit capability handle it passes back
//! on every config/storage call. The token identifies the caller for the
//! access-flag checks, so isolation never depends on inspecting the call
//! site.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::cache::CacheConfig;

/// Name of the distinguished core module. The core owns `core.yaml` and
/// bypasses cross-module flag checks.
pub const CORE_MODULE: &str = "core";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Capability handle identifying a registered module.
///
/// Only the registry can mint tokens; holding one is proof of registration.
#[derive(Clone, Debug)]
pub struct ModuleToken {
    name: Arc<str>,
    core: bool,
}

impl ModuleToken {
    pub(crate) fn new(name: &str, core: bool) -> Self {
        Self {
            name: Arc::from(name),
            core,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the core module's token.
    pub fn is_core(&self) -> bool {
        self.core
    }
}

struct ModuleInfo {
    token: ModuleToken,
    default_ttl: Duration,
}

/// Registry of all modules known to the runtime.
#[derive(Clone)]
pub struct ModuleRegistry {
    modules: Arc<DashMap<String, ModuleInfo>>,
    core: ModuleToken,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        let core = ModuleToken::new(CORE_MODULE, true);
        let modules = Arc::new(DashMap::new());
        modules.insert(
            CORE_MODULE.to_string(),
            ModuleInfo {
                token: core.clone(),
                default_ttl: DEFAULT_CACHE_TTL,
            },
        );

        info!("Module registry initialized");
        Self { modules, core }
    }

    /// Register a module, or return the existing token if the name is
    /// already registered. Registration is idempotent.
    pub fn register(&self, name: &str) -> ModuleToken {
        self.register_with_ttl(name, DEFAULT_CACHE_TTL)
    }

    /// Register a module with a custom default TTL for its caches.
    pub fn register_with_ttl(&self, name: &str, default_ttl: Duration) -> ModuleToken {
        if let Some(info) = self.modules.get(name) {
            return info.token.clone();
        }

        debug!(module = name, "Registering module");
        let token = ModuleToken::new(name, name == CORE_MODULE);
        self.modules.insert(
            name.to_string(),
            ModuleInfo {
                token: token.clone(),
                default_ttl,
            },
        );
        token
    }

    /// The core module's token.
    pub fn core(&self) -> &ModuleToken {
        &self.core
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Cache key namespace for a module, used to scope shared caches.
    pub fn cache_namespace(&self, name: &str) -> String {
        format!("module:{name}")
    }

    /// Cache configuration seeded with the module's registered default TTL.
    pub fn cache_config(&self, name: &str) -> CacheConfig {
        let ttl = self
            .modules
            .get(name)
            .map(|info| info.default_ttl)
            .unwrap_or(DEFAULT_CACHE_TTL);
        CacheConfig::default().default_ttl(ttl)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("module_count", &self.modules.len())
            .finish()
    }
}
