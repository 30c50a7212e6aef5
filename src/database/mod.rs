//! Database module exports.

mod batch;
mod pool;
mod schema;

pub use batch::{BatchStatement, BatchWriter, EntityRow};
pub use pool::Database;
pub use schema::{TABLE_PLAYER_SETTINGS, TABLE_PLAYER_STORAGE, ensure_column, ensure_tables, quote_ident};
