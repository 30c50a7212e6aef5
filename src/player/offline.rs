//! Scalar access to players who are not online.
//!
//! Offline access reads and writes the JSON columns directly; nothing is
//! cached and no Player record is created. Intended for admin tooling
//! and cross-session features like rank lookups.

use std::collections::BTreeMap;

use sqlx::Row;
use tracing::warn;

use crate::database::quote_ident;
use crate::error::StoreError;
use crate::module::ModuleToken;
use crate::value::{FromValue, Value};

use super::record::DataKind;
use super::store::PlayerStore;

impl PlayerStore {
    /// Read one key of an offline player's module blob. `Ok(None)` when
    /// the row, the column value, or the key is absent.
    pub async fn get_offline_data<T: FromValue>(
        &self,
        token: &ModuleToken,
        steam_id: u64,
        key: &str,
        kind: DataKind,
    ) -> Result<Option<T>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE `steam_id` = ?",
            quote_ident(&kind.column(token.name())),
            quote_ident(kind.table())
        );
        let Some(row) = sqlx::query(&sql)
            .bind(steam_id.to_string())
            .fetch_optional(self.pool())
            .await?
        else {
            return Ok(None);
        };

        let blob: Option<serde_json::Value> = row.try_get(0)?;
        let Some(serde_json::Value::Object(mut entries)) = blob else {
            return Ok(None);
        };
        let Some(raw) = entries.remove(key) else {
            return Ok(None);
        };
        match T::from_value(&Value::from(raw)) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(
                    steam_id,
                    module = token.name(),
                    key,
                    "Offline value has wrong type: {err}"
                );
                Ok(None)
            }
        }
    }

    /// Overwrite an offline player's module blob with the given entries.
    /// No-op when the player has no row yet.
    pub async fn set_offline_data(
        &self,
        token: &ModuleToken,
        steam_id: u64,
        entries: BTreeMap<String, Value>,
        kind: DataKind,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(&entries)?;
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE `steam_id` = ?",
            quote_ident(kind.table()),
            quote_ident(&kind.column(token.name()))
        );
        sqlx::query(&sql)
            .bind(json)
            .bind(steam_id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Reset an offline player's module blob back to the registered
    /// default template.
    pub async fn reset_offline_data(
        &self,
        token: &ModuleToken,
        steam_id: u64,
        kind: DataKind,
    ) -> Result<(), StoreError> {
        let Some(defaults) = self.default_template(token.name(), kind) else {
            warn!(
                module = token.name(),
                "Offline reset for module without a template"
            );
            return Ok(());
        };
        self.set_offline_data(token, steam_id, defaults.as_ref().clone(), kind)
            .await
    }
}
