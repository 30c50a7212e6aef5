//! Process-scoped runtime context tying the stores together.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{ConfigStore, ConfigWatcher};
use crate::database::{Database, ensure_tables};
use crate::module::{ModuleRegistry, ModuleToken};
use crate::player::PlayerStore;
use crate::settings::RuntimeConfig;

/// The shared runtime: one database pool, one config store, one player
/// store, one module registry. Host code creates exactly one and hands
/// clones of the `Arc` to every module.
pub struct Keystone {
    config: RuntimeConfig,
    db: Database,
    modules: ModuleRegistry,
    config_store: Arc<ConfigStore>,
    players: Arc<PlayerStore>,
    _watcher: Option<ConfigWatcher>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Keystone {
    /// Connect to the database, bootstrap the schema, and start the
    /// background machinery (config watcher, periodic flush).
    pub async fn init(config: RuntimeConfig) -> anyhow::Result<Arc<Self>> {
        info!("Starting Keystone runtime...");

        let db = Database::connect(&config.database_url).await?;
        ensure_tables(&db).await?;

        let config_store = ConfigStore::new(config.config_dir.clone());
        config_store.set_change_tracking(config.change_tracking);
        config_store.set_auto_reload(config.auto_reload);

        let watcher = if config.auto_reload {
            Some(ConfigWatcher::spawn(&config_store)?)
        } else {
            None
        };

        let players = Arc::new(PlayerStore::new(db.clone()));

        let context = Arc::new(Self {
            config,
            db,
            modules: ModuleRegistry::new(),
            config_store,
            players,
            _watcher: watcher,
            flush_task: Mutex::new(None),
        });
        context.spawn_flush_loop();

        info!("Keystone runtime ready");
        Ok(context)
    }

    fn spawn_flush_loop(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.flush_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(context) = weak.upgrade() else {
                    break;
                };
                if let Err(err) = context.players.flush_all().await {
                    error!("Periodic player flush failed: {err}");
                }
            }
        });
        *self.flush_task.lock() = Some(handle);
    }

    /// Register a module and get back its access token.
    pub fn register_module(&self, name: &str) -> ModuleToken {
        self.modules.register(name)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config_store
    }

    pub fn players(&self) -> &Arc<PlayerStore> {
        &self.players
    }

    /// Flush everything and stop the background flush loop. Call before
    /// process exit so no debounced saves or player batches are lost.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.flush_task.lock().take() {
            handle.abort();
        }
        self.config_store.flush_pending().await;
        let flushed = self.players.flush_all().await?;
        info!(players = flushed, "Keystone runtime shut down");
        Ok(())
    }
}
