//! Config tree data model.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::value::Value;

/// Access flags controlling cross-module visibility of a config item.
///
/// Flags are code-owned and never persisted to the config file; the
/// registering module re-applies them on every startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigFlags(u8);

impl ConfigFlags {
    pub const NONE: Self = Self(0);
    /// Other modules may read (and, subject to `LOCKED`, write) this item.
    pub const GLOBAL: Self = Self(1);
    /// Only the owning module may touch this item; cross-module access errors.
    pub const PROTECTED: Self = Self(2);
    /// Cross-module writes are silently dropped (reads still follow `GLOBAL`).
    pub const LOCKED: Self = Self(4);

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl std::ops::BitOr for ConfigFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One registered config value.
#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub name: String,
    pub description: String,
    pub default_value: Value,
    pub current_value: Value,
    pub flags: ConfigFlags,
}

/// Named group of items within a module.
#[derive(Debug)]
pub struct ConfigGroup {
    pub name: String,
    pub items: DashMap<String, ConfigItem>,
}

impl ConfigGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: DashMap::new(),
        }
    }
}

/// All config state owned by one module. Persists to one file.
#[derive(Debug)]
pub struct ModuleConfig {
    pub module_name: String,
    pub created_at: DateTime<Utc>,
    pub groups: DashMap<String, ConfigGroup>,
}

impl ModuleConfig {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            created_at: Utc::now(),
            groups: DashMap::new(),
        }
    }

    /// Drop groups that no longer contain any items, so they disappear
    /// from the persisted file.
    pub fn prune_empty_groups(&self) {
        self.groups.retain(|_, group| !group.items.is_empty());
    }
}
