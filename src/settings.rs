//! Runtime configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the shared data layer.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// MySQL connection URL.
    pub database_url: String,

    /// Directory holding `core.yaml` and `modules/*.yaml`.
    pub config_dir: PathBuf,

    /// Watch the config directory and apply edits made on disk.
    pub auto_reload: bool,

    /// Persist every config change, not just global/core ones.
    pub change_tracking: bool,

    /// Interval between background flushes of player data.
    pub flush_interval: Duration,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if `DATABASE_URL` is not set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let flush_interval = env::var("KEYSTONE_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            config_dir: env::var("KEYSTONE_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config")),
            auto_reload: env_flag("KEYSTONE_AUTO_RELOAD", true),
            change_tracking: env_flag("KEYSTONE_CHANGE_TRACKING", false),
            flush_interval,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(value.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
