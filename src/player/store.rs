//! Multi-tenant player store: attach, load, mutate, flush.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use sqlx::{Column, Row};
use tracing::{debug, error, info, warn};

use crate::database::{BatchWriter, Database, EntityRow, ensure_column, quote_ident};
use crate::error::StoreError;
use crate::module::ModuleToken;
use crate::value::{FromValue, Value};

use super::record::{DataKind, Player};

/// Delay between load attempts for a player whose initial load failed.
const LOAD_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Shared store of connected players and their module data.
///
/// Modules register default templates once; players attach on connect,
/// load asynchronously, and flush in batches or on demand. All access is
/// keyed by a [`ModuleToken`], so a module can only write under its own
/// column.
pub struct PlayerStore {
    db: Database,
    writer: BatchWriter,
    players: DashMap<u64, Arc<Player>>,
    default_settings: DashMap<String, Arc<BTreeMap<String, Value>>>,
    default_storage: DashMap<String, Arc<BTreeMap<String, Value>>>,
}

impl PlayerStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            writer: BatchWriter::new(),
            players: DashMap::new(),
            default_settings: DashMap::new(),
            default_storage: DashMap::new(),
        }
    }

    fn defaults_for(&self, kind: DataKind) -> &DashMap<String, Arc<BTreeMap<String, Value>>> {
        match kind {
            DataKind::Settings => &self.default_settings,
            DataKind::Storage => &self.default_storage,
        }
    }

    pub(crate) fn pool(&self) -> &sqlx::MySqlPool {
        self.db.pool()
    }

    pub(crate) fn default_template(
        &self,
        module: &str,
        kind: DataKind,
    ) -> Option<Arc<BTreeMap<String, Value>>> {
        self.defaults_for(kind)
            .get(module)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Register a module's default template for one data kind, adding the
    /// backing JSON column if the table does not have it yet.
    ///
    /// Players already loaded keep their current data; the new defaults
    /// reach them on their next load.
    pub async fn register_module_data(
        &self,
        token: &ModuleToken,
        kind: DataKind,
        defaults: BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        ensure_column(&self.db, kind.table(), &kind.column(token.name())).await?;
        self.defaults_for(kind)
            .insert(token.name().to_string(), Arc::new(defaults));
        debug!(module = token.name(), ?kind, "Registered module data template");
        Ok(())
    }

    /// Register a module's default settings template.
    pub async fn register_module_settings(
        &self,
        token: &ModuleToken,
        defaults: BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        self.register_module_data(token, DataKind::Settings, defaults)
            .await
    }

    /// Register a module's default storage template.
    pub async fn register_module_storage(
        &self,
        token: &ModuleToken,
        defaults: BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        self.register_module_data(token, DataKind::Storage, defaults)
            .await
    }

    /// Attach a connecting player and start its load in the background.
    /// Reads work immediately; writes unlock once the load completes.
    pub fn attach(self: &Arc<Self>, steam_id: u64, name: impl Into<String>) -> Arc<Player> {
        let player = Arc::new(Player::new(steam_id, name));
        self.players.insert(steam_id, Arc::clone(&player));
        self.spawn_load(Arc::clone(&player));
        player
    }

    fn spawn_load(self: &Arc<Self>, player: Arc<Player>) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match store.load_player(&player).await {
                    Ok(()) => break,
                    Err(err) => {
                        error!(
                            steam_id = player.steam_id(),
                            "Failed to load player data, retrying: {err}"
                        );
                        tokio::time::sleep(LOAD_RETRY_DELAY).await;
                        if !player.is_connected() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Load one player's rows from both tables, backfill defaults, and
    /// open the player for writes.
    pub async fn load_player(&self, player: &Arc<Player>) -> Result<(), StoreError> {
        self.update_last_online(player).await?;
        self.load_kind(player, DataKind::Settings).await?;
        self.load_kind(player, DataKind::Storage).await?;
        self.apply_default_templates(player);
        player.mark_loaded();
        info!(steam_id = player.steam_id(), "Player data loaded");
        Ok(())
    }

    fn apply_default_templates(&self, player: &Player) {
        for kind in [DataKind::Settings, DataKind::Storage] {
            for entry in self.defaults_for(kind).iter() {
                player.apply_defaults(entry.key(), entry.value(), kind);
            }
        }
    }

    async fn update_last_online(&self, player: &Player) -> Result<(), StoreError> {
        for kind in [DataKind::Settings, DataKind::Storage] {
            let sql = format!(
                "INSERT INTO {} (`steam_id`, `name`, `last_online`) VALUES (?, ?, NOW()) \
                 ON DUPLICATE KEY UPDATE `name` = VALUES(`name`), `last_online` = NOW()",
                quote_ident(kind.table())
            );
            sqlx::query(&sql)
                .bind(player.steam_id().to_string())
                .bind(player.name())
                .execute(self.db.pool())
                .await?;
        }
        Ok(())
    }

    async fn load_kind(&self, player: &Player, kind: DataKind) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE `steam_id` = ?",
            quote_ident(kind.table())
        );
        let Some(row) = sqlx::query(&sql)
            .bind(player.steam_id().to_string())
            .fetch_optional(self.db.pool())
            .await?
        else {
            return Ok(());
        };

        for (index, column) in row.columns().iter().enumerate() {
            let Some(module) = column.name().strip_suffix(kind.suffix()) else {
                continue;
            };
            let blob: Option<serde_json::Value> = row.try_get(index)?;
            if let Some(serde_json::Value::Object(entries)) = blob {
                let converted: BTreeMap<String, Value> = entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect();
                player.merge_loaded(module, kind, converted);
            }
        }
        Ok(())
    }

    /// Load every attached-but-unloaded player in one joined query.
    /// Returns the number of players loaded.
    pub async fn load_all_attached(&self) -> Result<usize, StoreError> {
        let pending: Vec<Arc<Player>> = self
            .players
            .iter()
            .filter(|entry| entry.value().is_connected() && !entry.value().is_loaded())
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        // Touch identity rows first so the join below finds everyone.
        let identity_rows: Vec<EntityRow> = pending
            .iter()
            .map(|player| EntityRow {
                steam_id: player.steam_id().to_string(),
                name: player.name().to_string(),
                columns: BTreeMap::new(),
            })
            .collect();
        self.writer
            .flush(
                &self.db,
                &[
                    (DataKind::Settings.table(), identity_rows.clone()),
                    (DataKind::Storage.table(), identity_rows),
                ],
            )
            .await?;

        // One aliased select covering every registered module column.
        let mut selected: Vec<(String, DataKind)> = Vec::new();
        let mut select_list = vec!["s.`steam_id` AS `steam_id`".to_string()];
        for kind in [DataKind::Settings, DataKind::Storage] {
            let table_alias = match kind {
                DataKind::Settings => "s",
                DataKind::Storage => "t",
            };
            for entry in self.defaults_for(kind).iter() {
                let alias = format!("col_{}", selected.len());
                select_list.push(format!(
                    "{table_alias}.{} AS `{alias}`",
                    quote_ident(&kind.column(entry.key()))
                ));
                selected.push((entry.key().clone(), kind));
            }
        }

        let placeholders = vec!["?"; pending.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM {} s LEFT JOIN {} t ON s.`steam_id` = t.`steam_id` \
             WHERE s.`steam_id` IN ({placeholders})",
            select_list.join(", "),
            quote_ident(DataKind::Settings.table()),
            quote_ident(DataKind::Storage.table()),
        );
        let mut query = sqlx::query(&sql);
        for player in &pending {
            query = query.bind(player.steam_id().to_string());
        }
        let rows = query.fetch_all(self.db.pool()).await?;

        let by_id: BTreeMap<u64, &Arc<Player>> = pending
            .iter()
            .map(|player| (player.steam_id(), player))
            .collect();
        for row in rows {
            let steam_id: String = row.try_get("steam_id")?;
            let Some(player) = steam_id.parse::<u64>().ok().and_then(|id| by_id.get(&id)) else {
                continue;
            };
            for (index, (module, kind)) in selected.iter().enumerate() {
                let alias = format!("col_{index}");
                let blob: Option<serde_json::Value> = row.try_get(alias.as_str())?;
                if let Some(serde_json::Value::Object(entries)) = blob {
                    let converted: BTreeMap<String, Value> = entries
                        .into_iter()
                        .map(|(key, value)| (key, Value::from(value)))
                        .collect();
                    player.merge_loaded(module, *kind, converted);
                }
            }
        }

        for player in &pending {
            self.apply_default_templates(player);
            player.mark_loaded();
        }
        info!(count = pending.len(), "Loaded attached players");
        Ok(pending.len())
    }

    pub fn get_player(&self, steam_id: u64) -> Option<Arc<Player>> {
        self.players.get(&steam_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every attached player.
    pub fn online_players(&self) -> Vec<Arc<Player>> {
        self.players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Read one of an online player's keys under the calling module.
    pub fn get_data<T: FromValue>(
        &self,
        token: &ModuleToken,
        steam_id: u64,
        key: &str,
        kind: DataKind,
    ) -> Option<T> {
        self.get_player(steam_id)?.get_data(token.name(), key, kind)
    }

    /// Write one of an online player's keys under the calling module.
    ///
    /// Returns `false` if the player is absent or not yet loaded. With
    /// `save_immediately` the module's row is flushed in the background
    /// instead of waiting for the next batch.
    pub fn set_data(
        self: &Arc<Self>,
        token: &ModuleToken,
        steam_id: u64,
        key: &str,
        value: impl Into<Value>,
        kind: DataKind,
        save_immediately: bool,
    ) -> bool {
        let Some(player) = self.get_player(steam_id) else {
            warn!(steam_id, module = token.name(), "Write to unknown player");
            return false;
        };
        let applied = player.set_data(token.name(), key, value.into(), kind);
        if applied && save_immediately {
            let store = Arc::clone(self);
            let module = token.name().to_string();
            tokio::spawn(async move {
                if let Err(err) = store.flush_player(&player, Some(&module)).await {
                    error!(steam_id, module, "Immediate flush failed: {err}");
                }
            });
        }
        applied
    }

    /// Reset one player's data for the calling module back to its
    /// registered defaults, persisting the reset.
    pub async fn reset_module_data(
        &self,
        token: &ModuleToken,
        steam_id: u64,
        kind: DataKind,
    ) -> Result<(), StoreError> {
        let Some(defaults) = self
            .defaults_for(kind)
            .get(token.name())
            .map(|entry| Arc::clone(entry.value()))
        else {
            warn!(module = token.name(), "Reset for module without a template");
            return Ok(());
        };
        let Some(player) = self.get_player(steam_id) else {
            return Ok(());
        };
        player.replace_module(token.name(), &defaults, kind);
        self.flush_player(&player, Some(token.name())).await
    }

    /// Reset storage back to defaults for every player row in the
    /// database, and for every player currently online. `module` limits
    /// the reset to one module; `None` resets all registered modules.
    pub async fn reset_storage_all(&self, module: Option<&str>) -> Result<(), StoreError> {
        let targets: Vec<(String, Arc<BTreeMap<String, Value>>)> = match module {
            Some(name) => self
                .default_storage
                .get(name)
                .map(|entry| vec![(name.to_string(), Arc::clone(entry.value()))])
                .unwrap_or_default(),
            None => self
                .default_storage
                .iter()
                .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
                .collect(),
        };
        if targets.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;
        for (name, defaults) in &targets {
            let json = serde_json::to_string(defaults.as_ref())?;
            let sql = format!(
                "UPDATE {} SET {} = ?",
                quote_ident(DataKind::Storage.table()),
                quote_ident(&DataKind::Storage.column(name))
            );
            sqlx::query(&sql).bind(json).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        for player in self.online_players() {
            for (name, defaults) in &targets {
                player.replace_module(name, defaults, DataKind::Storage);
            }
        }
        info!(modules = targets.len(), "Reset storage to defaults");
        Ok(())
    }

    /// Upsert one player's rows now. `module` limits the write to a
    /// single module column; `None` writes everything the player holds.
    pub async fn flush_player(
        &self,
        player: &Arc<Player>,
        module: Option<&str>,
    ) -> Result<(), StoreError> {
        if !player.is_loaded() {
            return Ok(());
        }
        for kind in [DataKind::Settings, DataKind::Storage] {
            let columns = match module {
                Some(name) => match player.snapshot_module(name, kind)? {
                    Some(json) => BTreeMap::from([(kind.column(name), json)]),
                    None => continue,
                },
                None => player.snapshot(kind)?,
            };
            if columns.is_empty() {
                continue;
            }
            let row = EntityRow {
                steam_id: player.steam_id().to_string(),
                name: player.name().to_string(),
                columns,
            };
            self.writer.flush_one(&self.db, kind.table(), row).await?;
        }
        Ok(())
    }

    /// Batch-flush every loaded player to both tables in one transaction.
    /// Returns the number of players written.
    pub async fn flush_all(&self) -> Result<usize, StoreError> {
        let mut settings_rows = Vec::new();
        let mut storage_rows = Vec::new();
        for entry in self.players.iter() {
            let player = entry.value();
            if !player.is_loaded() {
                continue;
            }
            let identity = (player.steam_id().to_string(), player.name().to_string());
            settings_rows.push(EntityRow {
                steam_id: identity.0.clone(),
                name: identity.1.clone(),
                columns: player.snapshot(DataKind::Settings)?,
            });
            storage_rows.push(EntityRow {
                steam_id: identity.0,
                name: identity.1,
                columns: player.snapshot(DataKind::Storage)?,
            });
        }
        let count = settings_rows.len();
        if count == 0 {
            return Ok(0);
        }
        self.writer
            .flush(
                &self.db,
                &[
                    (DataKind::Settings.table(), settings_rows),
                    (DataKind::Storage.table(), storage_rows),
                ],
            )
            .await?;
        debug!(count, "Flushed all player data");
        Ok(count)
    }

    /// Detach a disconnecting player, flushing their data first.
    pub async fn remove(&self, steam_id: u64) -> Result<(), StoreError> {
        let Some((_, player)) = self.players.remove(&steam_id) else {
            return Ok(());
        };
        player.mark_disconnected();
        if player.is_loaded() {
            self.flush_player(&player, None).await?;
        }
        info!(steam_id, "Player detached");
        Ok(())
    }
}
