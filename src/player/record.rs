//! In-memory player record: two module-keyed maps plus load state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::warn;

use crate::database::{TABLE_PLAYER_SETTINGS, TABLE_PLAYER_STORAGE};
use crate::value::{FromValue, Value};

/// Which of the two per-player maps (and wide tables) a key lives in.
/// Settings are player-tunable preferences; storage is module state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Settings,
    Storage,
}

impl DataKind {
    /// Database table backing this kind.
    pub fn table(self) -> &'static str {
        match self {
            DataKind::Settings => TABLE_PLAYER_SETTINGS,
            DataKind::Storage => TABLE_PLAYER_STORAGE,
        }
    }

    /// Column name suffix, including the dot.
    pub fn suffix(self) -> &'static str {
        match self {
            DataKind::Settings => ".settings",
            DataKind::Storage => ".storage",
        }
    }

    /// Full column name for a module in this kind's table.
    pub fn column(self, module: &str) -> String {
        format!("{module}{}", self.suffix())
    }
}

/// One connected player's data, shared across modules.
///
/// Reads are served from memory at all times; writes are rejected until
/// the initial database load completes so a late load cannot clobber
/// changes made against stale defaults.
#[derive(Debug)]
pub struct Player {
    steam_id: u64,
    name: String,
    settings: DashMap<String, DashMap<String, Value>>,
    storage: DashMap<String, DashMap<String, Value>>,
    loaded: AtomicBool,
    connected: AtomicBool,
}

impl Player {
    pub fn new(steam_id: u64, name: impl Into<String>) -> Self {
        Self {
            steam_id,
            name: name.into(),
            settings: DashMap::new(),
            storage: DashMap::new(),
            loaded: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    pub fn steam_id(&self) -> u64 {
        self.steam_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the initial database load has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn map(&self, kind: DataKind) -> &DashMap<String, DashMap<String, Value>> {
        match kind {
            DataKind::Settings => &self.settings,
            DataKind::Storage => &self.storage,
        }
    }

    /// Read a key, converting to the requested type.
    ///
    /// An exact module+key miss falls back to a suffix match so callers
    /// keep working across module renames that kept the trailing segment.
    pub fn get_data<T: FromValue>(&self, module: &str, key: &str, kind: DataKind) -> Option<T> {
        let map = self.map(kind);

        if let Some(items) = map.get(module) {
            if let Some(value) = items.get(key) {
                match T::from_value(&value) {
                    Ok(converted) => return Some(converted),
                    Err(err) => {
                        warn!(
                            steam_id = self.steam_id,
                            module, key, "Stored value has wrong type: {err}"
                        );
                    }
                }
            }
        }

        // Legacy fallback: suffix-match the module and key.
        for items in map.iter() {
            if !items.key().ends_with(module) {
                continue;
            }
            for item in items.value().iter() {
                if item.key().ends_with(key) {
                    if let Ok(converted) = T::from_value(item.value()) {
                        return Some(converted);
                    }
                }
            }
        }
        None
    }

    /// Write a key. Returns `false` (and drops the write) until the
    /// initial load has completed.
    pub fn set_data(&self, module: &str, key: &str, value: Value, kind: DataKind) -> bool {
        if !self.is_loaded() {
            warn!(
                steam_id = self.steam_id,
                module, key, "Dropping write before initial load"
            );
            return false;
        }
        self.map(kind)
            .entry(module.to_string())
            .or_default()
            .insert(key.to_string(), value);
        true
    }

    /// Merge a loaded column blob into the map, bypassing the load gate.
    pub(crate) fn merge_loaded(&self, module: &str, kind: DataKind, entries: BTreeMap<String, Value>) {
        let items = self.map(kind).entry(module.to_string()).or_default();
        for (key, value) in entries {
            items.insert(key, value);
        }
    }

    /// Insert every template key the player does not have yet. Runs on
    /// every load so new defaults reach existing players.
    pub(crate) fn apply_defaults(
        &self,
        module: &str,
        defaults: &BTreeMap<String, Value>,
        kind: DataKind,
    ) {
        let items = self.map(kind).entry(module.to_string()).or_default();
        for (key, value) in defaults {
            items.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Replace a module's data wholesale with its defaults.
    pub(crate) fn replace_module(
        &self,
        module: &str,
        defaults: &BTreeMap<String, Value>,
        kind: DataKind,
    ) {
        let fresh: DashMap<String, Value> = defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.map(kind).insert(module.to_string(), fresh);
    }

    /// Serialize one module's map to its JSON column value.
    pub fn snapshot_module(&self, module: &str, kind: DataKind) -> Result<Option<String>, serde_json::Error> {
        match self.map(kind).get(module) {
            Some(items) => {
                let ordered: BTreeMap<String, Value> = items
                    .iter()
                    .map(|item| (item.key().clone(), item.value().clone()))
                    .collect();
                serde_json::to_string(&ordered).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Serialize every module's map to `column -> json` for a batch row.
    pub fn snapshot(&self, kind: DataKind) -> Result<BTreeMap<String, String>, serde_json::Error> {
        let mut columns = BTreeMap::new();
        for entry in self.map(kind).iter() {
            let ordered: BTreeMap<String, Value> = entry
                .value()
                .iter()
                .map(|item| (item.key().clone(), item.value().clone()))
                .collect();
            columns.insert(kind.column(entry.key()), serde_json::to_string(&ordered)?);
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_player() -> Player {
        let player = Player::new(76561198000000001, "tester");
        player.mark_loaded();
        player
    }

    #[test]
    fn test_writes_dropped_before_load() {
        let player = Player::new(1, "early");
        assert!(!player.set_data("ranks", "Points", Value::Int(5), DataKind::Storage));
        assert_eq!(player.get_data::<i64>("ranks", "Points", DataKind::Storage), None);

        player.mark_loaded();
        assert!(player.set_data("ranks", "Points", Value::Int(5), DataKind::Storage));
        assert_eq!(
            player.get_data::<i64>("ranks", "Points", DataKind::Storage),
            Some(5)
        );
    }

    #[test]
    fn test_settings_and_storage_are_independent() {
        let player = loaded_player();
        player.set_data("hud", "Scale", Value::Float(1.5), DataKind::Settings);
        assert_eq!(
            player.get_data::<f64>("hud", "Scale", DataKind::Settings),
            Some(1.5)
        );
        assert_eq!(player.get_data::<f64>("hud", "Scale", DataKind::Storage), None);
    }

    #[test]
    fn test_suffix_fallback_finds_renamed_module() {
        let player = loaded_player();
        player.set_data("k4-ranks", "Points", Value::Int(100), DataKind::Storage);
        // Exact module "ranks" missing, but "k4-ranks" ends with it.
        assert_eq!(
            player.get_data::<i64>("ranks", "Points", DataKind::Storage),
            Some(100)
        );
        assert_eq!(player.get_data::<i64>("other", "Points", DataKind::Storage), None);
    }

    #[test]
    fn test_apply_defaults_preserves_existing_values() {
        let player = loaded_player();
        player.set_data("ranks", "Points", Value::Int(42), DataKind::Storage);

        let defaults = BTreeMap::from([
            ("Points".to_string(), Value::Int(0)),
            ("Rank".to_string(), Value::String("none".into())),
        ]);
        player.apply_defaults("ranks", &defaults, DataKind::Storage);

        assert_eq!(
            player.get_data::<i64>("ranks", "Points", DataKind::Storage),
            Some(42)
        );
        assert_eq!(
            player.get_data::<String>("ranks", "Rank", DataKind::Storage),
            Some("none".to_string())
        );
    }

    #[test]
    fn test_replace_module_resets_to_defaults() {
        let player = loaded_player();
        player.set_data("ranks", "Points", Value::Int(42), DataKind::Storage);
        player.set_data("ranks", "Extra", Value::Bool(true), DataKind::Storage);

        let defaults = BTreeMap::from([("Points".to_string(), Value::Int(0))]);
        player.replace_module("ranks", &defaults, DataKind::Storage);

        assert_eq!(
            player.get_data::<i64>("ranks", "Points", DataKind::Storage),
            Some(0)
        );
        assert_eq!(player.get_data::<bool>("ranks", "Extra", DataKind::Storage), None);
    }

    #[test]
    fn test_snapshot_produces_column_names() {
        let player = loaded_player();
        player.set_data("ranks", "Points", Value::Int(7), DataKind::Storage);
        player.set_data("stats", "Kills", Value::Int(3), DataKind::Storage);

        let columns = player.snapshot(DataKind::Storage).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns["ranks.storage"], r#"{"Points":7}"#);
        assert_eq!(columns["stats.storage"], r#"{"Kills":3}"#);
    }

    #[test]
    fn test_type_conversion_on_read() {
        let player = loaded_player();
        player.set_data("ranks", "Points", Value::Int(10), DataKind::Storage);
        // Widening int -> float works; mismatched reads return None.
        assert_eq!(
            player.get_data::<f64>("ranks", "Points", DataKind::Storage),
            Some(10.0)
        );
        assert_eq!(
            player.get_data::<String>("ranks", "Points", DataKind::Storage),
            Some("10".to_string())
        );
    }
}
