//! Access-controlled config registry with debounced persistence.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheConfig, ExpiringCache};
use crate::error::ConfigError;
use crate::module::ModuleToken;
use crate::sched::FlushScheduler;
use crate::value::{FromValue, Value};

use super::file;
use super::model::{ConfigFlags, ConfigGroup, ConfigItem, ModuleConfig};

/// Debounce window for config file saves. Rapid writes inside the window
/// coalesce into one disk write.
const SAVE_DELAY: Duration = Duration::from_millis(500);

/// Callback fired after an accepted config change:
/// `(module, group, key, new_value)`.
pub type ConfigChangedCallback = Arc<dyn Fn(&str, &str, &str, &Value) + Send + Sync>;

enum WriteOutcome {
    /// Value changed; persistence and invalidation were handled.
    Applied,
    /// New value equals the current one; nothing to do.
    Unchanged,
    /// Cross-module write to a `LOCKED` item: dropped silently by contract.
    RejectedSilently,
    /// Item does not exist in this module's tree.
    NotHere,
}

/// Hierarchical config registry shared by all modules.
///
/// Reads and writes are synchronous and backed by concurrent maps, so they
/// are safe on the simulation tick; only file persistence happens off-path
/// through the debounce scheduler.
pub struct ConfigStore {
    dir: PathBuf,
    modules: DashMap<String, Arc<ModuleConfig>>,
    /// Lookup acceleration keyed `caller:group:name`.
    lookup: ExpiringCache<String, Value>,
    subscribers: RwLock<Vec<ConfigChangedCallback>>,
    scheduler: FlushScheduler,
    /// Persist every accepted change, not just tracked items.
    change_tracking: AtomicBool,
    /// Gate for the file watcher's reload path.
    auto_reload: AtomicBool,
}

impl ConfigStore {
    /// Create the store rooted at `dir`. Must be called from within a tokio
    /// runtime (the save scheduler is spawned here).
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        let dir = dir.into();
        if let Err(err) = std::fs::create_dir_all(dir.join("modules")) {
            error!(dir = %dir.display(), "Failed to create config directory: {err}");
        }

        Arc::new_cyclic(|weak: &Weak<ConfigStore>| {
            let weak = weak.clone();
            let scheduler = FlushScheduler::spawn(Arc::new(move |module: String| {
                if let Some(store) = weak.upgrade() {
                    store.save_module_now(&module);
                }
            }));

            ConfigStore {
                dir,
                modules: DashMap::new(),
                lookup: ExpiringCache::new(CacheConfig::config_lookup()),
                subscribers: RwLock::new(Vec::new()),
                scheduler,
                change_tracking: AtomicBool::new(false),
                auto_reload: AtomicBool::new(false),
            }
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist every accepted change instead of only global/core items.
    pub fn set_change_tracking(&self, enabled: bool) {
        self.change_tracking.store(enabled, Ordering::Relaxed);
    }

    pub fn set_auto_reload(&self, enabled: bool) {
        self.auto_reload.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_reload(&self) -> bool {
        self.auto_reload.load(Ordering::Relaxed)
    }

    /// Subscribe to accepted config changes. Callbacks run synchronously on
    /// the writing thread and must be cheap.
    pub fn subscribe(&self, callback: ConfigChangedCallback) {
        self.subscribers.write().push(callback);
    }

    /// Register a config item for the calling module.
    ///
    /// Idempotent: re-registration refreshes flags, description, and the
    /// default value, but never resets a current value (including one
    /// loaded from a user-edited file).
    pub fn register<T: Into<Value>>(
        &self,
        caller: &ModuleToken,
        group_name: &str,
        config_name: &str,
        description: &str,
        default: T,
        flags: ConfigFlags,
    ) {
        let default = default.into();
        let module = self.module_entry(caller.name());

        let group = module
            .groups
            .entry(group_name.to_string())
            .or_insert_with(|| ConfigGroup::new(group_name));

        match group.items.entry(config_name.to_string()) {
            Entry::Occupied(mut existing) => {
                let item = existing.get_mut();
                item.flags = flags;
                item.description = description.to_string();
                item.default_value = default;
            }
            Entry::Vacant(slot) => {
                slot.insert(ConfigItem {
                    name: config_name.to_string(),
                    description: description.to_string(),
                    default_value: default.clone(),
                    current_value: default,
                    flags,
                });
            }
        }
        drop(group);

        self.scheduler.schedule(caller.name(), SAVE_DELAY);
    }

    /// Whether the caller's own module has this item registered.
    pub fn has_value(&self, caller: &ModuleToken, group_name: &str, config_name: &str) -> bool {
        let key = lookup_key(caller.name(), group_name, config_name);
        if self.lookup.try_get(&key).is_some() {
            return true;
        }

        let Some(module) = self.modules.get(caller.name()).map(|m| Arc::clone(&m)) else {
            return false;
        };
        let Some(group) = module.groups.get(group_name) else {
            return false;
        };
        match group.items.get(config_name) {
            Some(item) => {
                self.lookup.set(key, item.current_value.clone(), None);
                true
            }
            None => false,
        }
    }

    /// Resolve a config value for the caller.
    ///
    /// Resolution order: lookup cache, the caller's own module (always
    /// permitted), then other modules' items carrying the `GLOBAL` flag.
    pub fn get_value<T: FromValue>(
        &self,
        caller: &ModuleToken,
        group_name: &str,
        config_name: &str,
    ) -> Result<T, ConfigError> {
        let key = lookup_key(caller.name(), group_name, config_name);
        if let Some(cached) = self.lookup.try_get(&key) {
            match T::from_value(&cached) {
                Ok(value) => return Ok(value),
                // Stale type in cache; fall through to the tree.
                Err(_) => self.lookup.invalidate(&key),
            }
        }

        if let Some(module) = self.modules.get(caller.name()).map(|m| Arc::clone(&m)) {
            if let Some(value) = self.read_item(&module, group_name, config_name, caller, false)? {
                self.lookup.set(key, value.clone(), None);
                return convert(&value, group_name, config_name);
            }
        }

        for module in self.other_modules(caller.name()) {
            if let Some(value) = self.read_item(&module, group_name, config_name, caller, true)? {
                return convert(&value, group_name, config_name);
            }
        }

        Err(ConfigError::NotFound {
            module: caller.name().to_string(),
            group: group_name.to_string(),
            name: config_name.to_string(),
        })
    }

    /// Write a config value on behalf of the caller.
    ///
    /// Same module-boundary rule as [`Self::get_value`]. Writing an equal
    /// value is a no-op; `LOCKED` items drop cross-module writes silently
    /// (logged); `PROTECTED` items reject them with an error.
    pub fn set_value<T: Into<Value>>(
        &self,
        caller: &ModuleToken,
        group_name: &str,
        config_name: &str,
        value: T,
    ) -> Result<(), ConfigError> {
        let value = value.into();

        if let Some(module) = self.modules.get(caller.name()).map(|m| Arc::clone(&m)) {
            match self.write_item(&module, group_name, config_name, &value, caller, false)? {
                WriteOutcome::NotHere => {}
                _ => return Ok(()),
            }
        }

        for module in self.other_modules(caller.name()) {
            match self.write_item(&module, group_name, config_name, &value, caller, true)? {
                WriteOutcome::NotHere => {}
                _ => return Ok(()),
            }
        }

        Err(ConfigError::NotFound {
            module: caller.name().to_string(),
            group: group_name.to_string(),
            name: config_name.to_string(),
        })
    }

    /// Re-read one module's file and apply item-level differences.
    ///
    /// Only items whose on-disk value differs from memory are touched; each
    /// update invalidates just that item's cache entries. A module seen for
    /// the first time is inserted wholesale and its namespace invalidated.
    pub fn reload_module(&self, module_name: &str) -> anyhow::Result<()> {
        let path = file::module_path(&self.dir, module_name);
        let Some(fresh) = file::load(&path)? else {
            return Ok(());
        };

        let Some(existing) = self.modules.get(module_name).map(|m| Arc::clone(&m)) else {
            self.modules
                .insert(module_name.to_string(), Arc::new(fresh));
            let prefix = format!("{module_name}:");
            self.lookup.invalidate_where(|k| k.starts_with(&prefix));
            debug!(module = module_name, "Loaded new module config from disk");
            return Ok(());
        };

        // Collect differences first; invalidation and notification happen
        // with no tree locks held, since subscribers may read back in.
        let mut updates: Vec<(String, String, Value)> = Vec::new();
        for fresh_group in fresh.groups.iter() {
            let group = existing
                .groups
                .entry(fresh_group.key().clone())
                .or_insert_with(|| ConfigGroup::new(&fresh_group.name));

            for fresh_item in fresh_group.items.iter() {
                match group.items.entry(fresh_item.key().clone()) {
                    Entry::Occupied(mut slot) => {
                        let item = slot.get_mut();
                        if item.current_value != fresh_item.current_value {
                            item.current_value = fresh_item.current_value.clone();
                            updates.push((
                                fresh_group.key().clone(),
                                fresh_item.key().clone(),
                                fresh_item.current_value.clone(),
                            ));
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(fresh_item.value().clone());
                        updates.push((
                            fresh_group.key().clone(),
                            fresh_item.key().clone(),
                            fresh_item.current_value.clone(),
                        ));
                    }
                }
            }
        }

        if !updates.is_empty() {
            info!(
                module = module_name,
                changed = updates.len(),
                "Config reloaded from disk"
            );
        }
        for (group, key, value) in updates {
            self.invalidate_item(&group, &key);
            self.notify_changed(module_name, &group, &key, &value);
        }
        Ok(())
    }

    /// Force-reload every known module from disk.
    pub fn reload_all(&self) {
        self.lookup.invalidate_all();
        let names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Err(err) = self.reload_module(&name) {
                error!(module = %name, "Config reload failed: {err:#}");
            }
        }
    }

    /// Flush all debounced saves now. Used at shutdown.
    pub async fn flush_pending(&self) {
        self.scheduler.drain().await;
    }

    /// Serialize and write one module's file immediately.
    pub(crate) fn save_module_now(&self, module_name: &str) {
        let Some(module) = self.modules.get(module_name).map(|m| Arc::clone(&m)) else {
            return;
        };
        module.prune_empty_groups();

        let path = file::module_path(&self.dir, module_name);
        match file::save(&path, &module) {
            Ok(()) => debug!(module = module_name, "Config saved"),
            Err(err) => error!(module = module_name, "Config save failed: {err:#}"),
        }
    }

    /// Snapshot of every module tree except the caller's own, taken so the
    /// fallback scan never holds map guards across flag checks and
    /// subscriber callbacks.
    fn other_modules(&self, caller_name: &str) -> Vec<Arc<ModuleConfig>> {
        self.modules
            .iter()
            .filter(|entry| entry.key() != caller_name)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Get the module's live tree, loading its file on first touch so
    /// user edits made while the server was down survive registration.
    fn module_entry(&self, module_name: &str) -> Arc<ModuleConfig> {
        if let Some(module) = self.modules.get(module_name) {
            return Arc::clone(&module);
        }

        let loaded = match file::load(&file::module_path(&self.dir, module_name)) {
            Ok(Some(config)) => config,
            Ok(None) => ModuleConfig::new(module_name),
            Err(err) => {
                error!(module = module_name, "Config load failed: {err:#}");
                ModuleConfig::new(module_name)
            }
        };

        Arc::clone(
            &self
                .modules
                .entry(module_name.to_string())
                .or_insert_with(|| Arc::new(loaded)),
        )
    }

    fn read_item(
        &self,
        module: &ModuleConfig,
        group_name: &str,
        config_name: &str,
        caller: &ModuleToken,
        global_only: bool,
    ) -> Result<Option<Value>, ConfigError> {
        let Some(group) = module.groups.get(group_name) else {
            return Ok(None);
        };
        let Some(item) = group.items.get(config_name) else {
            return Ok(None);
        };

        let cross_module = caller.name() != module.module_name && !caller.is_core();

        if cross_module && item.flags.contains(ConfigFlags::PROTECTED) {
            warn!(
                module = caller.name(),
                owner = %module.module_name,
                "Blocked read of protected config '{group_name}.{config_name}'"
            );
            return Err(ConfigError::AccessDenied {
                module: caller.name().to_string(),
                group: group_name.to_string(),
                name: config_name.to_string(),
            });
        }

        if cross_module && !item.flags.contains(ConfigFlags::GLOBAL) {
            if !global_only {
                warn!(
                    module = caller.name(),
                    owner = %module.module_name,
                    "Attempt to access non-global config '{group_name}.{config_name}'"
                );
            }
            return Ok(None);
        }

        Ok(Some(item.current_value.clone()))
    }

    fn write_item(
        &self,
        module: &ModuleConfig,
        group_name: &str,
        config_name: &str,
        value: &Value,
        caller: &ModuleToken,
        global_only: bool,
    ) -> Result<WriteOutcome, ConfigError> {
        let Some(group) = module.groups.get(group_name) else {
            return Ok(WriteOutcome::NotHere);
        };
        let Some(mut item) = group.items.get_mut(config_name) else {
            return Ok(WriteOutcome::NotHere);
        };

        let cross_module = caller.name() != module.module_name && !caller.is_core();

        if cross_module {
            if item.flags.contains(ConfigFlags::PROTECTED) {
                return Err(ConfigError::AccessDenied {
                    module: caller.name().to_string(),
                    group: group_name.to_string(),
                    name: config_name.to_string(),
                });
            }
            if !item.flags.contains(ConfigFlags::GLOBAL) {
                if global_only {
                    return Ok(WriteOutcome::NotHere);
                }
                warn!(
                    module = caller.name(),
                    owner = %module.module_name,
                    "Attempt to modify non-global config '{group_name}.{config_name}'"
                );
                return Ok(WriteOutcome::NotHere);
            }
            if item.flags.contains(ConfigFlags::LOCKED) {
                warn!(
                    module = caller.name(),
                    owner = %module.module_name,
                    "Dropped write to locked config '{group_name}.{config_name}'"
                );
                return Ok(WriteOutcome::RejectedSilently);
            }
        }

        if item.current_value == *value {
            return Ok(WriteOutcome::Unchanged);
        }

        item.current_value = value.clone();
        let flags = item.flags;
        drop(item);
        drop(group);

        self.invalidate_item(group_name, config_name);
        self.notify_changed(&module.module_name, group_name, config_name, value);

        let tracked = self.change_tracking.load(Ordering::Relaxed)
            || flags.contains(ConfigFlags::GLOBAL)
            || caller.is_core();
        if tracked {
            self.scheduler.schedule(module.module_name.clone(), SAVE_DELAY);
        }

        Ok(WriteOutcome::Applied)
    }

    /// Drop every caller's cached copy of one item, whichever module read
    /// it through.
    fn invalidate_item(&self, group_name: &str, config_name: &str) {
        let suffix = format!(":{group_name}:{config_name}");
        self.lookup.invalidate_where(|k| k.ends_with(&suffix));
    }

    fn notify_changed(&self, module: &str, group: &str, key: &str, value: &Value) {
        let subscribers = self.subscribers.read().clone();
        for callback in subscribers {
            callback(module, group, key, value);
        }
    }
}

fn lookup_key(caller: &str, group: &str, name: &str) -> String {
    format!("{caller}:{group}:{name}")
}

fn convert<T: FromValue>(value: &Value, group: &str, name: &str) -> Result<T, ConfigError> {
    T::from_value(value).map_err(|source| ConfigError::Type {
        group: group.to_string(),
        name: name.to_string(),
        source,
    })
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("dir", &self.dir)
            .field("modules", &self.modules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleRegistry;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (tempfile::TempDir, Arc<ConfigStore>, ModuleRegistry) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path());
        (tmp, store, ModuleRegistry::new())
    }

    #[tokio::test]
    async fn test_register_then_read_own_value() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");

        store.register(&ranks, "Points", "Kill", "Points per kill", 6, ConfigFlags::NONE);

        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 6);
        assert!(store.has_value(&ranks, "Points", "Kill"));
        assert!(!store.has_value(&ranks, "Points", "Death"));
    }

    #[tokio::test]
    async fn test_cross_module_isolation_without_global() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        let stats = registry.register("Stats");

        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);

        let result: Result<i64, _> = store.get_value(&stats, "Points", "Kill");
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_global_flag_permits_cross_module_read_not_write() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        let stats = registry.register("Stats");

        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::GLOBAL);

        let value: i64 = store.get_value(&stats, "Points", "Kill").unwrap();
        assert_eq!(value, 6);

        // Global also permits the write; locked is what blocks it.
        store.set_value(&stats, "Points", "Kill", 9).unwrap();
        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn test_locked_drops_cross_module_write_silently() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        let stats = registry.register("Stats");

        store.register(
            &ranks,
            "Points",
            "Kill",
            "",
            6,
            ConfigFlags::GLOBAL | ConfigFlags::LOCKED,
        );

        store.set_value(&stats, "Points", "Kill", 99).unwrap();
        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 6);

        // The owner is not affected by the lock.
        store.set_value(&ranks, "Points", "Kill", 7).unwrap();
        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_protected_blocks_cross_module_access() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        let stats = registry.register("Stats");

        store.register(
            &ranks,
            "Secrets",
            "ApiKey",
            "",
            "hunter2",
            ConfigFlags::GLOBAL | ConfigFlags::PROTECTED,
        );

        let read: Result<String, _> = store.get_value(&stats, "Secrets", "ApiKey");
        assert!(matches!(read, Err(ConfigError::AccessDenied { .. })));

        let write = store.set_value(&stats, "Secrets", "ApiKey", "pwned");
        assert!(matches!(write, Err(ConfigError::AccessDenied { .. })));

        let own: String = store.get_value(&ranks, "Secrets", "ApiKey").unwrap();
        assert_eq!(own, "hunter2");
    }

    #[tokio::test]
    async fn test_core_bypasses_flag_checks() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");

        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);

        let value: i64 = store.get_value(registry.core(), "Points", "Kill").unwrap();
        assert_eq!(value, 6);
        store.set_value(registry.core(), "Points", "Kill", 12).unwrap();
        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 12);
    }

    #[tokio::test]
    async fn test_idempotent_registration_keeps_current_value() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");

        store.register(&ranks, "Points", "Kill", "old", 6, ConfigFlags::NONE);
        store.set_value(&ranks, "Points", "Kill", 42).unwrap();
        store.register(&ranks, "Points", "Kill", "new", 6, ConfigFlags::GLOBAL);

        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 42);

        let module = store.modules.get("Ranks").unwrap();
        let group = module.groups.get("Points").unwrap();
        let item = group.items.get("Kill").unwrap();
        assert_eq!(item.description, "new");
        assert!(item.flags.contains(ConfigFlags::GLOBAL));
    }

    #[tokio::test]
    async fn test_type_conversion_on_read() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");

        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);

        let as_float: f64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(as_float, 6.0);
        let as_string: String = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(as_string, "6");

        let bad: Result<Vec<i64>, _> = store.get_value(&ranks, "Points", "Kill");
        assert!(matches!(bad, Err(ConfigError::Type { .. })));
    }

    #[tokio::test]
    async fn test_change_notification_and_noop_suppression() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        store.subscribe(Arc::new(move |module, group, key, value| {
            assert_eq!(module, "Ranks");
            assert_eq!(group, "Points");
            assert_eq!(key, "Kill");
            assert_eq!(*value, Value::Int(10));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.set_value(&ranks, "Points", "Kill", 10).unwrap();
        // Equal value: no notification, no persistence churn.
        store.set_value(&ranks, "Points", "Kill", 10).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cross_module_cache_invalidated_on_change() {
        let (_tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        let stats = registry.register("Stats");

        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::GLOBAL);

        // Prime both caller caches.
        let _: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        let _: i64 = store.get_value(&stats, "Points", "Kill").unwrap();

        store.set_value(&ranks, "Points", "Kill", 20).unwrap();

        let from_stats: i64 = store.get_value(&stats, "Points", "Kill").unwrap();
        assert_eq!(from_stats, 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_debounced_save_coalesces_writes() {
        let (tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        store.set_change_tracking(true);

        store.register(&ranks, "Points", "Kill", "", 0, ConfigFlags::NONE);
        for i in 1..=5 {
            store.set_value(&ranks, "Points", "Kill", i).unwrap();
        }
        store.flush_pending().await;

        let loaded = file::load(&file::module_path(tmp.path(), "Ranks"))
            .unwrap()
            .unwrap();
        let group = loaded.groups.get("Points").unwrap();
        assert_eq!(group.items.get("Kill").unwrap().current_value, Value::Int(5));
    }

    #[tokio::test]
    async fn test_registration_merges_user_edited_file() {
        let tmp = tempfile::tempdir().unwrap();

        // First run: register and persist.
        {
            let store = ConfigStore::new(tmp.path());
            let registry = ModuleRegistry::new();
            let ranks = registry.register("Ranks");
            store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);
            store.set_change_tracking(true);
            store.set_value(&ranks, "Points", "Kill", 15).unwrap();
            store.flush_pending().await;
        }

        // Second run: registration must pick up the persisted value.
        let store = ConfigStore::new(tmp.path());
        let registry = ModuleRegistry::new();
        let ranks = registry.register("Ranks");
        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);

        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 15);
    }

    #[tokio::test]
    async fn test_reload_diffs_items_and_invalidates() {
        let (tmp, store, registry) = setup();
        let ranks = registry.register("Ranks");
        store.register(&ranks, "Points", "Kill", "", 6, ConfigFlags::NONE);
        store.register(&ranks, "Points", "Death", "", -2, ConfigFlags::NONE);

        // Prime the cache.
        let _: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();

        // Simulate an operator edit: bump Kill, leave Death alone.
        store.save_module_now("Ranks");
        let path = file::module_path(tmp.path(), "Ranks");
        let edited = std::fs::read_to_string(&path)
            .unwrap()
            .replace("currentValue: 6", "currentValue: 30");
        std::fs::write(&path, edited).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        store.subscribe(Arc::new(move |_, _, key, value| {
            assert_eq!(key, "Kill");
            assert_eq!(*value, Value::Int(30));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.reload_module("Ranks").unwrap();

        let value: i64 = store.get_value(&ranks, "Points", "Kill").unwrap();
        assert_eq!(value, 30);
        let untouched: i64 = store.get_value(&ranks, "Points", "Death").unwrap();
        assert_eq!(untouched, -2);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
