//! # Metadata Repository
//!
//! A small key/value table for sync bookkeeping that doesn't fit the
//! outbox or any single entity: `last_sync_id` (server log cursor),
//! `last_snapshot_timestamp`, and `last_push_timestamp`.

use sqlx::SqlitePool;

use crate::error::DbResult;

pub const LAST_SYNC_ID: &str = "last_sync_id";
pub const LAST_SNAPSHOT_TIMESTAMP: &str = "last_snapshot_timestamp";
pub const LAST_PUSH_TIMESTAMP: &str = "last_push_timestamp";

#[derive(Debug, Clone)]
pub struct MetadataRepository {
    pool: SqlitePool,
}

impl MetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MetadataRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM metadata WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.map(|(v,)| v))
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO metadata (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_last_sync_id(&self) -> DbResult<Option<i64>> {
        Ok(self
            .get(LAST_SYNC_ID)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub async fn set_last_sync_id(&self, sync_id: i64) -> DbResult<()> {
        self.set(LAST_SYNC_ID, &sync_id.to_string()).await
    }

    pub async fn get_last_snapshot_timestamp(&self) -> DbResult<Option<i64>> {
        Ok(self
            .get(LAST_SNAPSHOT_TIMESTAMP)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub async fn set_last_snapshot_timestamp(&self, timestamp_ms: i64) -> DbResult<()> {
        self.set(LAST_SNAPSHOT_TIMESTAMP, &timestamp_ms.to_string())
            .await
    }

    pub async fn get_last_push_timestamp(&self) -> DbResult<Option<i64>> {
        Ok(self
            .get(LAST_PUSH_TIMESTAMP)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub async fn set_last_push_timestamp(&self, timestamp_ms: i64) -> DbResult<()> {
        self.set(LAST_PUSH_TIMESTAMP, &timestamp_ms.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn unset_key_is_none() {
        let db = db().await;
        assert_eq!(db.metadata().get_last_sync_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let db = db().await;
        let repo = db.metadata();
        repo.set_last_sync_id(42).await.unwrap();
        assert_eq!(repo.get_last_sync_id().await.unwrap(), Some(42));

        repo.set_last_sync_id(43).await.unwrap();
        assert_eq!(repo.get_last_sync_id().await.unwrap(), Some(43));
    }
}
