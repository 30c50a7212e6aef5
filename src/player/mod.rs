//! Per-player data: settings and storage, loaded from and flushed to
//! the wide MySQL tables.
//!
//! ## Architecture
//!
//! - [`record`]: the in-memory [`Player`] record with its two
//!   module-keyed maps and load gating.
//! - [`store`]: the [`PlayerStore`] that owns attached players, default
//!   templates, loading and flushing.
//! - [`offline`]: scalar database access for players who are not online.
//!
//! ## Usage
//!
//! Modules register a default template once, then read and write through
//! their [`ModuleToken`](crate::module::ModuleToken):
//!
//! ```ignore
//! store.register_module_data(&token, DataKind::Storage, defaults).await?;
//! let player = store.attach(steam_id, name);
//! store.set_data(&token, steam_id, "Points", 100i64, DataKind::Storage, false);
//! ```

mod offline;
mod record;
mod store;

pub use record::{DataKind, Player};
pub use store::PlayerStore;
