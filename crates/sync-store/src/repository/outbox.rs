//! # Outbox Repository
//!
//! Persists the client's outbox: one row per locally-committed mutation
//! awaiting transmission to the server. `sequence_number` allocation and
//! entity-row writes that must be atomic with an outbox append go through
//! [`append_in_tx`], which runs inside the caller's transaction.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use sync_core::backoff::next_retry_at;
use sync_core::outbox::MAX_RETRY_ATTEMPTS;
use sync_core::{EntityType, OpType, OutboxRecord, OutboxStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
struct OutboxRow {
    id: String,
    sequence_number: i64,
    entity_type: String,
    entity_id: String,
    op_type: String,
    data: String,
    timestamp: chrono::DateTime<Utc>,
    status: String,
    retry_count: i64,
    next_retry_at: Option<i64>,
    last_error: Option<String>,
}

impl OutboxRow {
    fn into_record(self) -> DbResult<OutboxRecord> {
        let entity_type = match self.entity_type.as_str() {
            "order" => EntityType::Order,
            "order_line" => EntityType::OrderLine,
            other => return Err(DbError::malformed("entity_type", other)),
        };
        let op_type = match self.op_type.as_str() {
            "CREATE" => OpType::Create,
            "UPDATE" => OpType::Update,
            "DELETE" => OpType::Delete,
            other => return Err(DbError::malformed("op_type", other)),
        };
        let status = match self.status.as_str() {
            "pending" => OutboxStatus::Pending,
            "syncing" => OutboxStatus::Syncing,
            "synced" => OutboxStatus::Synced,
            "failed" => OutboxStatus::Failed,
            "rejected" => OutboxStatus::Rejected,
            other => return Err(DbError::malformed("status", other)),
        };
        Ok(OutboxRecord {
            id: Uuid::parse_str(&self.id).map_err(|e| DbError::malformed("id", e.to_string()))?,
            sequence_number: self.sequence_number,
            entity_type,
            entity_id: Uuid::parse_str(&self.entity_id)
                .map_err(|e| DbError::malformed("entity_id", e.to_string()))?,
            op_type,
            data: serde_json::from_str(&self.data)?,
            timestamp: self.timestamp,
            status,
            retry_count: self.retry_count,
            next_retry_at: self.next_retry_at,
            last_error: self.last_error,
        })
    }
}

/// Repository for the local outbox table.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Appends an outbox record as part of an already-open transaction,
    /// assigning it the next sequence number. Callers use this to keep
    /// the entity-row write and the outbox append atomic (§4.1).
    pub async fn append_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
        entity_id: Uuid,
        op_type: OpType,
        data: serde_json::Value,
    ) -> DbResult<OutboxRecord> {
        let sequence_number: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM outbox")
                .fetch_one(&mut **tx)
                .await?;

        let id = Uuid::new_v4();
        let timestamp = Utc::now();
        let data_text = serde_json::to_string(&data)?;

        sqlx::query(
            r#"
            INSERT INTO outbox (
                id, sequence_number, entity_type, entity_id, op_type,
                data, timestamp, status, retry_count, next_retry_at, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, NULL, NULL)
            "#,
        )
        .bind(id.to_string())
        .bind(sequence_number)
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .bind(op_type.as_str())
        .bind(&data_text)
        .bind(timestamp)
        .execute(&mut **tx)
        .await?;

        debug!(%id, sequence_number, %entity_type, %entity_id, %op_type, "appended outbox record");

        Ok(OutboxRecord {
            id,
            sequence_number,
            entity_type,
            entity_id,
            op_type,
            data,
            timestamp,
            status: OutboxStatus::Pending,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        })
    }

    /// Returns pending operations per `getPendingOperations` (§4.1):
    /// status=pending, or status=failed with an elapsed `next_retry_at`.
    /// Ordered ascending by `sequence_number`.
    pub async fn get_pending_operations(&self) -> DbResult<Vec<OutboxRecord>> {
        let now_ms = Utc::now().timestamp_millis();
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, sequence_number, entity_type, entity_id, op_type,
                   data, timestamp, status, retry_count, next_retry_at, last_error
            FROM outbox
            WHERE status = 'pending'
               OR (status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= ?1)
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_record).collect()
    }

    /// Marks a set of outbox ids as `syncing`.
    pub async fn mark_syncing(&self, ids: &[Uuid]) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE outbox SET status = 'syncing' WHERE id = ?1")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Marks a single outbox id as `synced` (terminal).
    pub async fn mark_synced(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE outbox SET status = 'synced', last_error = NULL WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks a batch of outbox ids as `synced` in one transaction.
    pub async fn mark_synced_bulk(&self, ids: &[Uuid]) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE outbox SET status = 'synced', last_error = NULL WHERE id = ?1")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Records a transport failure: increments `retry_count`, computes the
    /// next backoff deadline, and transitions to `failed`. Once
    /// `retry_count` exceeds [`MAX_RETRY_ATTEMPTS`], `next_retry_at` is
    /// left `null`, making the op terminally failed.
    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> DbResult<()> {
        let row: (i64,) = sqlx::query_as("SELECT retry_count FROM outbox WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("outbox", id.to_string()))?;

        let retry_count = row.0 + 1;
        let now_ms = Utc::now().timestamp_millis();
        let next_retry = if retry_count > MAX_RETRY_ATTEMPTS {
            None
        } else {
            next_retry_at(retry_count, now_ms)
        };

        sqlx::query(
            r#"
            UPDATE outbox SET
                status = 'failed',
                retry_count = ?2,
                next_retry_at = ?3,
                last_error = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(retry_count)
        .bind(next_retry)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks an op `rejected` (terminal) — used for permanent business
    /// errors returned by the server.
    pub async fn mark_rejected(&self, id: Uuid, message: &str) -> DbResult<()> {
        sqlx::query("UPDATE outbox SET status = 'rejected', last_error = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of operations still outstanding: pending, syncing, or
    /// failed-but-not-yet-exhausted. Feeds `SyncStatus.pendingOperations`.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM outbox
            WHERE status IN ('pending', 'syncing')
               OR (status = 'failed' AND next_retry_at IS NOT NULL)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// All outbox rows for a set of entities, used by the pull engine to
    /// find pending work that must be rebased over an incoming server op.
    pub async fn get_all_pending(&self) -> DbResult<Vec<OutboxRecord>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, sequence_number, entity_type, entity_id, op_type,
                   data, timestamp, status, retry_count, next_retry_at, last_error
            FROM outbox
            WHERE status IN ('pending', 'syncing', 'failed')
            ORDER BY sequence_number ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxRow::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence_numbers() {
        let db = db().await;
        let mut tx = db.pool().begin().await.unwrap();
        let first = OutboxRepository::append_in_tx(
            &mut tx,
            EntityType::Order,
            Uuid::new_v4(),
            OpType::Create,
            json!({}),
        )
        .await
        .unwrap();
        let second = OutboxRepository::append_in_tx(
            &mut tx,
            EntityType::Order,
            Uuid::new_v4(),
            OpType::Create,
            json!({}),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
    }

    #[tokio::test]
    async fn mark_failed_schedules_backoff_then_exhausts() {
        let db = db().await;
        let repo = db.outbox();
        let mut tx = db.pool().begin().await.unwrap();
        let op = OutboxRepository::append_in_tx(
            &mut tx,
            EntityType::Order,
            Uuid::new_v4(),
            OpType::Create,
            json!({}),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        for _ in 0..5 {
            repo.mark_failed(op.id, "boom").await.unwrap();
        }
        let pending = repo.get_pending_operations().await.unwrap();
        // retry_count=5 is still within MAX_RETRY_ATTEMPTS, but next_retry_at
        // is far in the future so it's not yet due.
        assert!(pending.is_empty());

        repo.mark_failed(op.id, "boom").await.unwrap();
        let all = repo.get_all_pending().await.unwrap();
        assert_eq!(all[0].next_retry_at, None);
    }

    #[tokio::test]
    async fn synced_ops_are_not_pending() {
        let db = db().await;
        let repo = db.outbox();
        let mut tx = db.pool().begin().await.unwrap();
        let op = OutboxRepository::append_in_tx(
            &mut tx,
            EntityType::Order,
            Uuid::new_v4(),
            OpType::Create,
            json!({}),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        repo.mark_synced(op.id).await.unwrap();
        let pending = repo.get_pending_operations().await.unwrap();
        assert!(pending.is_empty());
    }
}
