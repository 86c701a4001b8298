use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use super::{KvStore, StorageEstimate, StoreError};

/// Key-value store kept in the `kv_store` table.
#[derive(Clone)]
pub struct PgKv {
    db: PgPool,
    quota: Option<u64>,
}

impl PgKv {
    pub async fn connect(database_url: &str, quota: Option<u64>) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db, quota })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl KvStore for PgKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT value
              FROM kv_store
             WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
               SET value = EXCLUDED.value,
                   updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;
        debug!(key, bytes = value.len(), "kv set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn estimate(&self) -> Result<Option<StorageEstimate>, StoreError> {
        let Some(quota) = self.quota else {
            return Ok(None);
        };
        let (usage,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COALESCE(SUM(octet_length(key) + octet_length(value)), 0)::BIGINT
              FROM kv_store
            "#,
        )
        .fetch_one(&self.db)
        .await?;
        Ok(Some(StorageEstimate {
            usage: usage.max(0) as u64,
            quota,
        }))
    }
}
