//! YAML persistence for module config trees.
//!
//! One file per module: `core.yaml` for the core, `modules/<name>.yaml`
//! for everything else. Files are regenerated wholesale on save, never
//! patched in place, and carry a generated header so operators know where
//! edits belong.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::module::CORE_MODULE;
use crate::value::Value;

use super::model::{ConfigFlags, ConfigGroup, ConfigItem, ModuleConfig};

/// Path of a module's config file under the config directory.
pub fn module_path(dir: &Path, module: &str) -> PathBuf {
    if module == CORE_MODULE {
        dir.join("core.yaml")
    } else {
        dir.join("modules").join(format!("{module}.yaml"))
    }
}

/// Reverse of [`module_path`]: which module does a changed file belong to?
pub fn module_for_path(dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(dir).ok()?;
    let mut parts = relative.components();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), None, None) if first.as_os_str() == "core.yaml" => {
            Some(CORE_MODULE.to_string())
        }
        (Some(first), Some(second), None) if first.as_os_str() == "modules" => Path::new(
            second.as_os_str(),
        )
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemFile {
    name: String,
    description: String,
    default_value: Value,
    current_value: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct GroupFile {
    name: String,
    items: BTreeMap<String, ItemFile>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleFile {
    module_name: String,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    groups: BTreeMap<String, GroupFile>,
}

/// Load a module config from disk. `Ok(None)` if the file does not exist.
///
/// Items loaded from disk carry no flags; flags are re-applied by the
/// owning module at registration time.
pub fn load(path: &Path) -> anyhow::Result<Option<ModuleConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let parsed: ModuleFile = serde_yaml::from_str(&yaml)
        .with_context(|| format!("parsing config file {}", path.display()))?;

    let config = ModuleConfig {
        module_name: parsed.module_name,
        created_at: parsed.created_at,
        groups: dashmap::DashMap::new(),
    };

    for (group_key, group_file) in parsed.groups {
        let group = ConfigGroup::new(&group_file.name);
        for (item_key, item_file) in group_file.items {
            let current = item_file
                .current_value
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| item_file.default_value.clone());
            group.items.insert(
                item_key,
                ConfigItem {
                    name: item_file.name,
                    description: item_file.description,
                    default_value: item_file.default_value,
                    current_value: current,
                    flags: ConfigFlags::NONE,
                },
            );
        }
        config.groups.insert(group_key, group);
    }

    Ok(Some(config))
}

/// Write a module config to disk, regenerating the whole file.
pub fn save(path: &Path, config: &ModuleConfig) -> anyhow::Result<()> {
    let snapshot = ModuleFile {
        module_name: config.module_name.clone(),
        created_at: config.created_at,
        last_updated: Utc::now(),
        groups: config
            .groups
            .iter()
            .map(|group| {
                (
                    group.key().clone(),
                    GroupFile {
                        name: group.name.clone(),
                        items: group
                            .items
                            .iter()
                            .map(|item| {
                                (
                                    item.key().clone(),
                                    ItemFile {
                                        name: item.name.clone(),
                                        description: item.description.clone(),
                                        default_value: item.default_value.clone(),
                                        current_value: Some(item.current_value.clone()),
                                    },
                                )
                            })
                            .collect(),
                    },
                )
            })
            .collect(),
    };

    let header = format!(
        "# This file is generated by the Keystone runtime.\n\
         # Module: {}\n\
         # Edit values freely; structure and descriptions are rewritten on save.\n",
        config.module_name
    );
    let yaml = serde_yaml::to_string(&snapshot)
        .with_context(|| format!("serializing config for module {}", config.module_name))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    std::fs::write(path, header + &yaml)
        .with_context(|| format!("writing config file {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path_layout() {
        let dir = Path::new("/cfg");
        assert_eq!(module_path(dir, CORE_MODULE), Path::new("/cfg/core.yaml"));
        assert_eq!(
            module_path(dir, "ranks"),
            Path::new("/cfg/modules/ranks.yaml")
        );
    }

    #[test]
    fn test_module_for_path_round_trip() {
        let dir = Path::new("/cfg");
        assert_eq!(
            module_for_path(dir, &module_path(dir, "ranks")).as_deref(),
            Some("ranks")
        );
        assert_eq!(
            module_for_path(dir, &module_path(dir, CORE_MODULE)).as_deref(),
            Some(CORE_MODULE)
        );
        assert_eq!(module_for_path(dir, Path::new("/cfg/other.txt")), None);
        assert_eq!(module_for_path(dir, Path::new("/elsewhere/x.yaml")), None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = module_path(tmp.path(), "ranks");

        let config = ModuleConfig::new("ranks");
        let group = ConfigGroup::new("Points");
        group.items.insert(
            "Kill".to_string(),
            ConfigItem {
                name: "Kill".to_string(),
                description: "Points per kill".to_string(),
                default_value: Value::Int(6),
                current_value: Value::Int(10),
                flags: ConfigFlags::GLOBAL,
            },
        );
        config.groups.insert("Points".to_string(), group);

        save(&path, &config).unwrap();
        let loaded = load(&path).unwrap().unwrap();

        assert_eq!(loaded.module_name, "ranks");
        let group = loaded.groups.get("Points").unwrap();
        let item = group.items.get("Kill").unwrap();
        assert_eq!(item.current_value, Value::Int(10));
        assert_eq!(item.default_value, Value::Int(6));
        // Flags never persist.
        assert_eq!(item.flags, ConfigFlags::NONE);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(&module_path(tmp.path(), "ghost")).unwrap().is_none());
    }

    #[test]
    fn test_null_current_value_falls_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = module_path(tmp.path(), "ranks");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "moduleName: ranks\n\
             createdAt: 2024-01-01T00:00:00Z\n\
             lastUpdated: 2024-01-01T00:00:00Z\n\
             groups:\n  \
               Points:\n    \
                 name: Points\n    \
                 items:\n      \
                   Kill:\n        \
                     name: Kill\n        \
                     description: ''\n        \
                     defaultValue: 6\n        \
                     currentValue: null\n",
        )
        .unwrap();

        let loaded = load(&path).unwrap().unwrap();
        let group = loaded.groups.get("Points").unwrap();
        assert_eq!(
            group.items.get("Kill").unwrap().current_value,
            Value::Int(6)
        );
    }
}
