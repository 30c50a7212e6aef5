//! Filesystem watcher feeding debounced config reloads.

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info};

use crate::sched::FlushScheduler;

use super::file;
use super::store::ConfigStore;

/// Debounce window for file-change signals. Editors fire several events per
/// save; one reload per quiet second is plenty.
const RELOAD_DELAY: Duration = Duration::from_secs(1);

/// Watches the config directory and reloads edited module files.
///
/// The watcher only reacts while the store's auto-reload flag is set;
/// toggling the flag does not require re-creating the watcher.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching the store's config directory. Must be called from
    /// within a tokio runtime.
    pub fn spawn(store: &Arc<ConfigStore>) -> anyhow::Result<Self> {
        let dir = store.dir().to_path_buf();
        let weak: Weak<ConfigStore> = Arc::downgrade(store);

        let scheduler = FlushScheduler::spawn(Arc::new(move |path: String| {
            let Some(store) = weak.upgrade() else {
                return;
            };
            if !store.auto_reload() {
                return;
            }
            let Some(module) = file::module_for_path(store.dir(), Path::new(&path)) else {
                return;
            };
            match store.reload_module(&module) {
                Ok(()) => info!(module = %module, "Config file change applied"),
                Err(err) => error!(module = %module, "Config reload failed: {err:#}"),
            }
        }));

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| {
                let Ok(event) = result else {
                    return;
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    if path.extension().is_some_and(|ext| ext == "yaml") {
                        scheduler.schedule(path.to_string_lossy().into_owned(), RELOAD_DELAY);
                    }
                }
            })?;
        watcher.watch(&dir, RecursiveMode::Recursive)?;

        info!(dir = %dir.display(), "Config file watcher started");
        Ok(Self { _watcher: watcher })
    }
}
