//! Config registry - hierarchical, access-controlled module configuration.
//!
//! Values live in a module → group → item tree held in concurrent maps.
//! Each module's tree persists to one human-editable YAML file; saves are
//! debounced so bursts of writes coalesce into a single disk write, and an
//! optional file watcher feeds edits back in through a diffing reload.
//!
//! Module boundaries are enforced by access flags, not physical isolation:
//! a module always reaches its own items, and reaches other modules' items
//! only when they carry the `GLOBAL` flag.

mod file;
mod model;
mod store;
mod watch;

pub use model::{ConfigFlags, ConfigGroup, ConfigItem, ModuleConfig};
pub use store::{ConfigChangedCallback, ConfigStore};
pub use watch::ConfigWatcher;
