//! Error taxonomy for the runtime layer.
//!
//! Registry and store methods return typed errors only for contract
//! violations the caller can act on (missing keys, denied access, bad
//! conversions). Transient I/O failures are logged and retried internally
//! rather than surfaced to tick-thread callers.

use thiserror::Error;

use crate::value::ValueError;

/// Errors produced by the config registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The key was never registered in any config reachable from the caller.
    #[error("config '{group}.{name}' not found for module '{module}'")]
    NotFound {
        module: String,
        group: String,
        name: String,
    },

    /// A cross-module read or write was blocked by the item's flags.
    #[error("config '{group}.{name}' is protected from module '{module}'")]
    AccessDenied {
        module: String,
        group: String,
        name: String,
    },

    /// The stored value could not be converted to the requested type.
    #[error("config '{group}.{name}': {source}")]
    Type {
        group: String,
        name: String,
        #[source]
        source: ValueError,
    },
}

/// Errors produced by the player store and batch persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Player data could not be loaded. Retried on a timer by the store.
    #[error("failed to load data for player {steam_id}: {message}")]
    Load { steam_id: u64, message: String },

    /// A flush failed and was rolled back. In-memory state stays
    /// authoritative until the next successful flush.
    #[error("failed to flush player data: {message}")]
    Flush { message: String },
}
