//! # Change Log
//!
//! Append-only record of every mutation the conflict resolver accepts.
//! Drives both the pull feed (`GET /sync/pull?since=`) and the resolver's
//! own conflict detection: each entry also carries the set of fields a
//! mutation touched, so the resolver can union them across a version
//! range to learn exactly which fields changed underneath a stale client.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use sync_core::{EntityType, OpType};

#[derive(Debug, Clone)]
pub struct ChangeLogEntry {
    pub sync_id: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub op_type: OpType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ChangeLogRow {
    sync_id: i64,
    entity_type: String,
    entity_id: String,
    op_type: String,
    data: String,
    timestamp: DateTime<Utc>,
}

impl ChangeLogRow {
    fn into_entry(self) -> ServerResult<ChangeLogEntry> {
        let entity_type = match self.entity_type.as_str() {
            "order" => EntityType::Order,
            "order_line" => EntityType::OrderLine,
            other => return Err(ServerError::UnknownEntityType(other.to_string())),
        };
        let op_type = match self.op_type.as_str() {
            "CREATE" => OpType::Create,
            "UPDATE" => OpType::Update,
            "DELETE" => OpType::Delete,
            other => return Err(ServerError::malformed("op_type", other.to_string())),
        };
        Ok(ChangeLogEntry {
            sync_id: self.sync_id,
            entity_type,
            entity_id: Uuid::parse_str(&self.entity_id)
                .map_err(|e| ServerError::malformed("entity_id", e.to_string()))?,
            op_type,
            data: serde_json::from_str(&self.data)?,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChangeLogRepository {
    pool: SqlitePool,
}

impl ChangeLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ChangeLogRepository { pool }
    }

    /// Appends one entry inside the caller's transaction and returns the
    /// newly assigned, globally monotonic `sync_id`.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        tx: &mut Transaction<'_, Sqlite>,
        entity_type: EntityType,
        entity_id: Uuid,
        op_type: OpType,
        data: &Value,
        fields: &[String],
        new_version: i64,
    ) -> ServerResult<i64> {
        let now = Utc::now();
        let data_json = serde_json::to_string(data)?;
        let fields_json = serde_json::to_string(fields)?;

        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO change_log (entity_type, entity_id, op_type, data, fields, new_version, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING sync_id
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .bind(op_type.as_str())
        .bind(data_json)
        .bind(fields_json)
        .bind(new_version)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.0)
    }

    /// Fetches up to `limit` entries with `sync_id > since`, ordered
    /// ascending, plus whether more remain beyond the page.
    pub async fn fetch_since(&self, since: i64, limit: i64) -> ServerResult<(Vec<ChangeLogEntry>, bool)> {
        let rows = sqlx::query_as::<_, ChangeLogRow>(
            r#"
            SELECT sync_id, entity_type, entity_id, op_type, data, timestamp
            FROM change_log WHERE sync_id > ?1 ORDER BY sync_id ASC LIMIT ?2
            "#,
        )
        .bind(since)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let entries = rows
            .into_iter()
            .take(limit as usize)
            .map(ChangeLogRow::into_entry)
            .collect::<ServerResult<Vec<_>>>()?;
        Ok((entries, has_more))
    }

    /// Unions the field sets of every log entry for `(entity_type,
    /// entity_id)` whose `new_version` falls in `(since_version,
    /// current_version]` — the set of fields the resolver must treat as
    /// "changed underneath the client" when detecting a conflict.
    pub async fn fields_changed_in_range(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        since_version: i64,
        current_version: i64,
    ) -> ServerResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT fields FROM change_log
            WHERE entity_type = ?1 AND entity_id = ?2
              AND new_version > ?3 AND new_version <= ?4
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id.to_string())
        .bind(since_version)
        .bind(current_version)
        .fetch_all(&self.pool)
        .await?;

        let mut union = HashSet::new();
        for (fields_json,) in rows {
            let fields: Vec<String> = serde_json::from_str(&fields_json)?;
            union.extend(fields);
        }
        Ok(union)
    }

    pub async fn latest_sync_id(&self) -> ServerResult<i64> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(sync_id) FROM change_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{ServerDatabase, ServerDbConfig};
    use serde_json::json;

    async fn db() -> ServerDatabase {
        ServerDatabase::new(ServerDbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn append_assigns_increasing_sync_ids() {
        let db = db().await;
        let id = Uuid::new_v4();
        let mut tx = db.pool().begin().await.unwrap();
        let first = ChangeLogRepository::append(
            &mut tx,
            EntityType::Order,
            id,
            OpType::Create,
            &json!({"partner_id": id}),
            &["partner_id".to_string()],
            1,
        )
        .await
        .unwrap();
        let second = ChangeLogRepository::append(
            &mut tx,
            EntityType::Order,
            id,
            OpType::Update,
            &json!({"status": 1}),
            &["status".to_string()],
            2,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert!(second > first);
        let (entries, has_more) = db.change_log().fetch_since(0, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!has_more);
    }

    #[tokio::test]
    async fn fields_changed_in_range_unions_across_entries() {
        let db = db().await;
        let id = Uuid::new_v4();
        let mut tx = db.pool().begin().await.unwrap();
        ChangeLogRepository::append(
            &mut tx,
            EntityType::Order,
            id,
            OpType::Update,
            &json!({"status": 1}),
            &["status".to_string()],
            2,
        )
        .await
        .unwrap();
        ChangeLogRepository::append(
            &mut tx,
            EntityType::Order,
            id,
            OpType::Update,
            &json!({"comment": "x"}),
            &["comment".to_string()],
            3,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let changed = db
            .change_log()
            .fields_changed_in_range(EntityType::Order, id, 1, 3)
            .await
            .unwrap();
        assert!(changed.contains("status"));
        assert!(changed.contains("comment"));
    }
}
