//! Table bootstrap and dynamic column evolution.
//!
//! Both player tables are wide: fixed identity columns plus one JSON
//! column per registered module. Modules appear over time, so columns are
//! added lazily via `information_schema` probes rather than migrations.

use tracing::info;

use crate::error::StoreError;

use super::Database;

/// Wide table holding per-player settings, one JSON column per module.
pub const TABLE_PLAYER_SETTINGS: &str = "keystone_player_settings";
/// Wide table holding per-player storage, one JSON column per module.
pub const TABLE_PLAYER_STORAGE: &str = "keystone_player_storage";

/// Quote an identifier for MySQL, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Create both player tables if they do not exist yet.
pub async fn ensure_tables(db: &Database) -> Result<(), StoreError> {
    for table in [TABLE_PLAYER_SETTINGS, TABLE_PLAYER_STORAGE] {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
               `steam_id` VARCHAR(32) NOT NULL PRIMARY KEY,\
               `name` VARCHAR(128) NOT NULL,\
               `last_online` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
            quote_ident(table)
        );
        sqlx::query(&sql).execute(db.pool()).await?;
    }
    Ok(())
}

/// Add a module's JSON column to `table` if it is not there yet.
///
/// Safe to call on every registration; the probe makes it idempotent.
pub async fn ensure_column(db: &Database, table: &str, column: &str) -> Result<(), StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_one(db.pool())
    .await?;

    if count == 0 {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} JSON NULL",
            quote_ident(table),
            quote_ident(column)
        );
        sqlx::query(&sql).execute(db.pool()).await?;
        info!(table, column, "Added module column");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("plain"), "`plain`");
        assert_eq!(quote_ident("ranks.settings"), "`ranks.settings`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }
}
