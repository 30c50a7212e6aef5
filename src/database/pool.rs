//! MySQL connection pool wrapper.

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::info;

/// Database handle shared by the stores. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: MySqlPool,
}

impl Database {
    /// Connect to MySQL with the given URL and verify the connection.
    ///
    /// # Errors
    /// Returns an error if the connection or the verification query fails.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        // Ping to verify the connection before anything depends on it.
        sqlx::query("SELECT 1").execute(&pool).await?;

        info!("Successfully connected to MySQL");
        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}
