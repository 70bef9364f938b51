//! # Order Repository
//!
//! Entity-facing CRUD for [`Order`], with automatic outbox emission.
//! `create`/`update`/`delete` each write the entity row and append an
//! outbox record in one transaction (§4.1, §4.2).

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox::OutboxRepository;
use sync_core::{EntityType, OpType, Order, OrderStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
struct OrderRow {
    id: String,
    partner_id: String,
    status: i64,
    order_date: Option<DateTime<Utc>>,
    delivery_date: DateTime<Utc>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    deleted_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self) -> DbResult<Order> {
        Ok(Order {
            id: Uuid::parse_str(&self.id).map_err(|e| DbError::malformed("id", e.to_string()))?,
            partner_id: Uuid::parse_str(&self.partner_id)
                .map_err(|e| DbError::malformed("partner_id", e.to_string()))?,
            status: OrderStatus::try_from(self.status as i32)
                .map_err(|e| DbError::malformed("status", e))?,
            order_date: self.order_date,
            delivery_date: self.delivery_date,
            comment: self.comment,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
            deleted_at: self.deleted_at,
        })
    }
}

/// Fields supplied by the UI when creating a new pre-order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub partner_id: Uuid,
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_date: DateTime<Utc>,
    pub comment: Option<String>,
}

/// A partial update to an existing order. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub order_date: Option<Option<DateTime<Utc>>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub comment: Option<Option<String>>,
}

fn patch_to_json(patch: &OrderPatch) -> Value {
    let mut map = serde_json::Map::new();
    if let Some(status) = patch.status {
        map.insert("status".into(), json!(status.code()));
    }
    if let Some(order_date) = &patch.order_date {
        map.insert("order_date".into(), json!(order_date));
    }
    if let Some(delivery_date) = patch.delivery_date {
        map.insert("delivery_date".into(), json!(delivery_date));
    }
    if let Some(comment) = &patch.comment {
        map.insert("comment".into(), json!(comment));
    }
    Value::Object(map)
}

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Fetches one order, excluding soft-deleted rows.
    pub async fn get(&self, id: Uuid) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, partner_id, status, order_date, delivery_date, comment,
                   created_at, updated_at, version, deleted_at
            FROM orders WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_order).transpose()
    }

    /// Fetches an order regardless of soft-delete status, for sync-internal
    /// callers (apply/rebase, reconciliation).
    pub async fn get_including_deleted(&self, id: Uuid) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, partner_id, status, order_date, delivery_date, comment,
                   created_at, updated_at, version, deleted_at
            FROM orders WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_order).transpose()
    }

    /// Orders due for a given delivery date (the `["recap", date]` query
    /// key), excluding soft-deleted rows.
    pub async fn recap_for_delivery_date(&self, date: DateTime<Utc>) -> DbResult<Vec<Order>> {
        let start = date.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end = start + chrono::Duration::days(1);
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, partner_id, status, order_date, delivery_date, comment,
                   created_at, updated_at, version, deleted_at
            FROM orders
            WHERE deleted_at IS NULL AND delivery_date >= ?1 AND delivery_date < ?2
            ORDER BY delivery_date ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// All orders for a partner, excluding soft-deleted rows.
    pub async fn where_partner_id(&self, partner_id: Uuid) -> DbResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, partner_id, status, order_date, delivery_date, comment,
                   created_at, updated_at, version, deleted_at
            FROM orders WHERE partner_id = ?1 AND deleted_at IS NULL
            ORDER BY delivery_date ASC
            "#,
        )
        .bind(partner_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// Creates a new order and appends a CREATE outbox record atomically.
    pub async fn create(&self, fields: NewOrder) -> DbResult<Order> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::now_v7(),
            partner_id: fields.partner_id,
            status: OrderStatus::default(),
            order_date: fields.order_date,
            delivery_date: fields.delivery_date,
            comment: fields.comment,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, partner_id, status, order_date, delivery_date, comment,
                created_at, updated_at, version, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)
            "#,
        )
        .bind(order.id.to_string())
        .bind(order.partner_id.to_string())
        .bind(order.status.code())
        .bind(order.order_date)
        .bind(order.delivery_date)
        .bind(&order.comment)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&mut *tx)
        .await?;

        let data = serde_json::to_value(&order)?;
        OutboxRepository::append_in_tx(&mut tx, EntityType::Order, order.id, OpType::Create, data)
            .await?;

        tx.commit().await?;
        debug!(id = %order.id, "created order");
        Ok(order)
    }

    /// Applies a patch, bumping `version`, and appends an UPDATE outbox
    /// record whose `data` carries the patch plus the pre-increment
    /// `version` (the server's `expected_version`).
    pub async fn update(&self, id: Uuid, patch: OrderPatch) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, partner_id, status, order_date, delivery_date, comment,
                   created_at, updated_at, version, deleted_at
            FROM orders WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("order", id.to_string()))?;
        let current = row.into_order()?;
        if current.deleted_at.is_some() {
            return Err(DbError::malformed("order", "already deleted"));
        }

        let now = Utc::now();
        let updated = Order {
            status: patch.status.unwrap_or(current.status),
            order_date: patch.order_date.clone().unwrap_or(current.order_date),
            delivery_date: patch.delivery_date.unwrap_or(current.delivery_date),
            comment: patch.comment.clone().unwrap_or_else(|| current.comment.clone()),
            updated_at: now,
            version: current.version + 1,
            ..current.clone()
        };

        sqlx::query(
            r#"
            UPDATE orders SET
                status = ?2, order_date = ?3, delivery_date = ?4, comment = ?5,
                updated_at = ?6, version = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(updated.status.code())
        .bind(updated.order_date)
        .bind(updated.delivery_date)
        .bind(&updated.comment)
        .bind(updated.updated_at)
        .bind(updated.version)
        .execute(&mut *tx)
        .await?;

        let mut data = patch_to_json(&patch);
        data.as_object_mut()
            .unwrap()
            .insert("version".into(), json!(current.version));
        OutboxRepository::append_in_tx(&mut tx, EntityType::Order, id, OpType::Update, data)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Soft-deletes the order and appends a DELETE outbox record
    /// atomically. `data` carries `{"version": current.version}`.
    pub async fn delete(&self, id: Uuid) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, partner_id, status, order_date, delivery_date, comment, created_at, updated_at, version, deleted_at FROM orders WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("order", id.to_string()))?;
        let current = row.into_order()?;
        if current.deleted_at.is_some() {
            return Err(DbError::malformed("order", "already deleted"));
        }

        let now = Utc::now();
        let deleted = Order {
            deleted_at: Some(now),
            updated_at: now,
            version: current.version + 1,
            ..current.clone()
        };

        sqlx::query("UPDATE orders SET deleted_at = ?2, updated_at = ?2, version = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(now)
            .bind(deleted.version)
            .execute(&mut *tx)
            .await?;

        let data = json!({ "version": current.version });
        OutboxRepository::append_in_tx(&mut tx, EntityType::Order, id, OpType::Delete, data)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    // -------------------------------------------------------------------
    // Sync-internal: applied directly by the pull engine and reconciler,
    // never through the outbox.
    // -------------------------------------------------------------------

    /// `put`s a full row with the given version, used by the initial
    /// snapshot and by pull's CREATE apply.
    pub async fn put(&self, order: &Order) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, partner_id, status, order_date, delivery_date, comment,
                created_at, updated_at, version, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                partner_id = excluded.partner_id, status = excluded.status,
                order_date = excluded.order_date, delivery_date = excluded.delivery_date,
                comment = excluded.comment, created_at = excluded.created_at,
                updated_at = excluded.updated_at, version = excluded.version,
                deleted_at = excluded.deleted_at
            "#,
        )
        .bind(order.id.to_string())
        .bind(order.partner_id.to_string())
        .bind(order.status.code())
        .bind(order.order_date)
        .bind(order.delivery_date)
        .bind(&order.comment)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .bind(order.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bulk variant of [`put`](Self::put) for the initial snapshot.
    pub async fn bulk_put(&self, orders: &[Order]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO orders (
                    id, partner_id, status, order_date, delivery_date, comment,
                    created_at, updated_at, version, deleted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    partner_id = excluded.partner_id, status = excluded.status,
                    order_date = excluded.order_date, delivery_date = excluded.delivery_date,
                    comment = excluded.comment, updated_at = excluded.updated_at,
                    version = excluded.version, deleted_at = excluded.deleted_at
                "#,
            )
            .bind(order.id.to_string())
            .bind(order.partner_id.to_string())
            .bind(order.status.code())
            .bind(order.order_date)
            .bind(order.delivery_date)
            .bind(&order.comment)
            .bind(order.created_at)
            .bind(order.updated_at)
            .bind(order.version)
            .bind(order.deleted_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Projects an incoming server patch onto the local row, applying only
    /// the writable field set for Order (§4.4 apply/rebase).
    pub async fn apply_patch(&self, id: Uuid, data: &Value, new_version: i64) -> DbResult<()> {
        let obj = data.as_object();
        let status = obj.and_then(|o| o.get("status")).and_then(|v| v.as_i64());
        let comment = obj.and_then(|o| o.get("comment")).cloned();
        let delivery_date = obj
            .and_then(|o| o.get("delivery_date"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let order_date = obj.and_then(|o| o.get("order_date")).cloned();
        let updated_at = obj
            .and_then(|o| o.get("updated_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let deleted_at = obj
            .and_then(|o| o.get("deleted_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        sqlx::query(
            r#"
            UPDATE orders SET
                status = COALESCE(?2, status),
                comment = COALESCE(?3, comment),
                delivery_date = COALESCE(?4, delivery_date),
                order_date = COALESCE(?5, order_date),
                updated_at = ?6,
                deleted_at = COALESCE(?7, deleted_at),
                version = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(status)
        .bind(comment.map(|v| v.as_str().map(|s| s.to_string())))
        .bind(delivery_date)
        .bind(order_date.map(|v| v.as_str().map(|s| s.to_string())))
        .bind(updated_at)
        .bind(deleted_at)
        .bind(new_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrites a single field from a server-wins conflict resolution.
    pub async fn set_field(&self, id: Uuid, field: &str, value: &Value) -> DbResult<()> {
        match field {
            "status" => {
                if let Some(code) = value.as_i64() {
                    sqlx::query("UPDATE orders SET status = ?2 WHERE id = ?1")
                        .bind(id.to_string())
                        .bind(code)
                        .execute(&self.pool)
                        .await?;
                }
            }
            "comment" => {
                sqlx::query("UPDATE orders SET comment = ?2 WHERE id = ?1")
                    .bind(id.to_string())
                    .bind(value.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            "delivery_date" => {
                if let Some(dt) = value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                {
                    sqlx::query("UPDATE orders SET delivery_date = ?2 WHERE id = ?1")
                        .bind(id.to_string())
                        .bind(dt.with_timezone(&Utc))
                        .execute(&self.pool)
                        .await?;
                }
            }
            "order_date" => {
                let dt = value
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc));
                sqlx::query("UPDATE orders SET order_date = ?2 WHERE id = ?1")
                    .bind(id.to_string())
                    .bind(dt)
                    .execute(&self.pool)
                    .await?;
            }
            other => debug!(field = %other, "ignoring unknown conflict field for order"),
        }
        Ok(())
    }

    /// Sets the local `version` after a push acknowledgement.
    pub async fn update_version(&self, id: Uuid, new_version: i64) -> DbResult<()> {
        sqlx::query("UPDATE orders SET version = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(new_version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-deletes locally with a bumped version (pull's DELETE apply).
    pub async fn soft_delete(&self, id: Uuid, new_version: i64) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE orders SET deleted_at = ?2, version = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(now)
            .bind(new_version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Restores a soft-deleted order (DELETE conflict: server refused).
    pub async fn restore(&self, id: Uuid, new_version: i64) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE orders SET deleted_at = NULL, version = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(new_version)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
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
    async fn create_writes_row_and_outbox_atomically() {
        let db = db().await;
        let order = db
            .orders()
            .create(NewOrder {
                partner_id: Uuid::new_v4(),
                order_date: None,
                delivery_date: Utc::now(),
                comment: None,
            })
            .await
            .unwrap();

        assert_eq!(order.version, 1);
        let pending = db.outbox().get_pending_operations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, order.id);
        assert_eq!(pending[0].op_type, OpType::Create);
    }

    #[tokio::test]
    async fn update_bumps_version_and_records_expected_version() {
        let db = db().await;
        let order = db
            .orders()
            .create(NewOrder {
                partner_id: Uuid::new_v4(),
                order_date: None,
                delivery_date: Utc::now(),
                comment: None,
            })
            .await
            .unwrap();
        let pending = db.outbox().get_pending_operations().await.unwrap();
        for op in &pending {
            db.outbox().mark_synced(op.id).await.unwrap();
        }

        let updated = db
            .orders()
            .update(
                order.id,
                OrderPatch {
                    comment: Some(Some("hello".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        let pending = db.outbox().get_pending_operations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].data["version"], json!(1));
    }

    #[tokio::test]
    async fn delete_soft_deletes_and_excludes_from_reads() {
        let db = db().await;
        let order = db
            .orders()
            .create(NewOrder {
                partner_id: Uuid::new_v4(),
                order_date: None,
                delivery_date: Utc::now(),
                comment: None,
            })
            .await
            .unwrap();

        db.orders().delete(order.id).await.unwrap();
        assert!(db.orders().get(order.id).await.unwrap().is_none());
        assert!(db
            .orders()
            .get_including_deleted(order.id)
            .await
            .unwrap()
            .is_some());
    }
}
