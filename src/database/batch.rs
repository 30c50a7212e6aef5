//! Batched upserts for the wide player tables.
//!
//! Statement building is pure so it can be tested without a database:
//! rows are chunked, the column set of each chunk is the union of the
//! modules any row in it touches, and rows lacking a column contribute a
//! literal `NULL` instead of a bind placeholder. Execution wraps every
//! statement of a flush in a single transaction.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::StoreError;

use super::Database;
use super::schema::quote_ident;

/// Rows per multi-row INSERT. Large enough to amortize round trips,
/// small enough to stay under packet limits with big JSON blobs.
const BATCH_SIZE: usize = 32;

/// One player's pending write for a single table: identity plus the
/// serialized JSON blob per module column.
#[derive(Debug, Clone)]
pub struct EntityRow {
    pub steam_id: String,
    pub name: String,
    pub columns: BTreeMap<String, String>,
}

/// A built upsert: SQL text plus the bind arguments in placeholder order.
#[derive(Debug)]
pub struct BatchStatement {
    pub sql: String,
    pub args: Vec<String>,
}

/// Builds and executes batched `INSERT ... ON DUPLICATE KEY UPDATE`
/// statements for the player tables.
#[derive(Debug, Default)]
pub struct BatchWriter;

impl BatchWriter {
    pub fn new() -> Self {
        Self
    }

    /// Build the upsert statements for `rows` against `table`, chunked at
    /// the batch size.
    pub fn build_statements(&self, table: &str, rows: &[EntityRow]) -> Vec<BatchStatement> {
        rows.chunks(BATCH_SIZE)
            .map(|chunk| build_chunk(table, chunk))
            .collect()
    }

    /// Flush several tables' worth of rows in one transaction. Either
    /// every statement applies or none do.
    pub async fn flush(
        &self,
        db: &Database,
        tables: &[(&str, Vec<EntityRow>)],
    ) -> Result<(), StoreError> {
        let statements: Vec<BatchStatement> = tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .flat_map(|(table, rows)| self.build_statements(table, rows.as_slice()))
            .collect();
        if statements.is_empty() {
            return Ok(());
        }

        let mut tx = db.pool().begin().await?;
        for statement in &statements {
            let mut query = sqlx::query(&statement.sql);
            for arg in &statement.args {
                query = query.bind(arg);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(statements = statements.len(), "Flushed player data batch");
        Ok(())
    }

    /// Upsert a single row immediately, outside any batch.
    pub async fn flush_one(
        &self,
        db: &Database,
        table: &str,
        row: EntityRow,
    ) -> Result<(), StoreError> {
        let statement = build_chunk(table, std::slice::from_ref(&row));
        let mut query = sqlx::query(&statement.sql);
        for arg in &statement.args {
            query = query.bind(arg);
        }
        query.execute(db.pool()).await?;
        Ok(())
    }
}

fn build_chunk(table: &str, chunk: &[EntityRow]) -> BatchStatement {
    // Union of module columns touched by any row in this chunk, in a
    // deterministic order.
    let columns: BTreeSet<&str> = chunk
        .iter()
        .flat_map(|row| row.columns.keys().map(String::as_str))
        .collect();

    let mut column_list = vec!["`steam_id`".to_string(), "`name`".to_string(), "`last_online`".to_string()];
    column_list.extend(columns.iter().map(|c| quote_ident(c)));

    let mut args = Vec::new();
    let mut tuples = Vec::with_capacity(chunk.len());
    for row in chunk {
        let mut placeholders = vec!["?".to_string(), "?".to_string(), "NOW()".to_string()];
        args.push(row.steam_id.clone());
        args.push(row.name.clone());
        for column in &columns {
            match row.columns.get(*column) {
                Some(json) => {
                    placeholders.push("?".to_string());
                    args.push(json.clone());
                }
                None => placeholders.push("NULL".to_string()),
            }
        }
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    // steam_id and name stay as inserted; everything else takes the new
    // value on conflict.
    let mut updates = vec!["`last_online` = VALUES(`last_online`)".to_string()];
    updates.extend(
        columns
            .iter()
            .map(|c| format!("{0} = VALUES({0})", quote_ident(c))),
    );

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
        quote_ident(table),
        column_list.join(", "),
        tuples.join(", "),
        updates.join(", ")
    );
    BatchStatement { sql, args }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(steam_id: u64, columns: &[(&str, &str)]) -> EntityRow {
        EntityRow {
            steam_id: steam_id.to_string(),
            name: format!("player{steam_id}"),
            columns: columns
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_chunking_at_batch_size() {
        let rows: Vec<EntityRow> = (0..40)
            .map(|i| row(i, &[("ranks.storage", "{}")]))
            .collect();
        let statements = BatchWriter::new().build_statements("t", &rows);
        assert_eq!(statements.len(), 2);
        // 32 rows * (steam_id, name, column) then 8 rows of the same.
        assert_eq!(statements[0].args.len(), 32 * 3);
        assert_eq!(statements[1].args.len(), 8 * 3);
    }

    #[test]
    fn test_union_columns_and_null_placeholders() {
        let rows = vec![
            row(1, &[("a.storage", r#"{"x":1}"#)]),
            row(2, &[("b.storage", r#"{"y":2}"#)]),
        ];
        let statements = BatchWriter::new().build_statements("t", &rows);
        assert_eq!(statements.len(), 1);
        let stmt = &statements[0];

        // Both columns appear; each row has a NULL for the one it lacks.
        assert!(stmt.sql.contains("`a.storage`"));
        assert!(stmt.sql.contains("`b.storage`"));
        assert!(stmt.sql.contains("NULL"));

        // Placeholder count matches args: 2 identity + 1 json per row.
        let placeholders = stmt.sql.matches('?').count();
        assert_eq!(placeholders, stmt.args.len());
        assert_eq!(stmt.args.len(), 6);
        assert_eq!(stmt.args[2], r#"{"x":1}"#);
    }

    #[test]
    fn test_update_clause_excludes_identity() {
        let statements =
            BatchWriter::new().build_statements("t", &[row(1, &[("m.settings", "{}")])]);
        let sql = &statements[0].sql;
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(sql.contains("`last_online` = VALUES(`last_online`)"));
        assert!(sql.contains("`m.settings` = VALUES(`m.settings`)"));
        assert!(!sql.contains("`steam_id` = VALUES"));
        assert!(!sql.contains("`name` = VALUES"));
    }

    #[test]
    fn test_empty_rows_build_nothing() {
        assert!(BatchWriter::new().build_statements("t", &[]).is_empty());
    }
}
