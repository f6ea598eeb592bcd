//! Config store backed by a `connections` table in a metadata MySQL database.

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use common::errors::{AppError, AppResult};
use common::models::ConnectionConfig;

use super::ConfigStore;

/// Row from the `connections` table.
#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    name: String,
    host: String,
    port: u16,
    username: String,
}

impl From<ConnectionRow> for ConnectionConfig {
    fn from(row: ConnectionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            host: row.host,
            port: row.port,
            user: row.username,
        }
    }
}

/// Persists configs in MySQL. The table has no password column.
pub struct MySqlConfigStore {
    pool: MySqlPool,
}

impl MySqlConfigStore {
    /// Connects to the metadata database and ensures the table exists.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to open metadata database: {}", e)))?;
        let store = Self { pool };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS `connections` (
                `id`         VARCHAR(64)       NOT NULL,
                `position`   INT UNSIGNED      NOT NULL,
                `name`       VARCHAR(100)      NOT NULL,
                `host`       VARCHAR(255)      NOT NULL,
                `port`       SMALLINT UNSIGNED NOT NULL,
                `username`   VARCHAR(128)      NOT NULL,
                `created_at` DATETIME          NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (`id`),
                KEY `idx_position` (`position`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create connections table: {}", e)))?;

        tracing::info!("Metadata table `connections` ensured");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MySqlConfigStore {
    async fn load_all(&self) -> AppResult<Vec<ConnectionConfig>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            "SELECT `id`, `name`, `host`, `port`, `username` FROM `connections` ORDER BY `position`",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to load connections: {}", e)))?;

        Ok(rows.into_iter().map(ConnectionConfig::from).collect())
    }

    async fn save_all(&self, configs: &[ConnectionConfig]) -> AppResult<()> {
        let storage = |e: sqlx::Error| AppError::Storage(format!("Failed to save connections: {}", e));

        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query("DELETE FROM `connections`")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        for (position, config) in configs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO `connections` (`id`, `position`, `name`, `host`, `port`, `username`)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&config.id)
            .bind(position as u32)
            .bind(&config.name)
            .bind(&config.host)
            .bind(config.port)
            .bind(&config.user)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    fn store_id(&self) -> &'static str {
        "mysql"
    }
}
