//! # Server-Side Order Repository
//!
//! Unlike the client's `OrderRepository`, there is no outbox here: every
//! write is applied directly by the conflict resolver inside the same
//! transaction that appends a change-log entry (§4.5).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use sync_core::{Order, OrderStatus};

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
    fn into_order(self) -> ServerResult<Order> {
        Ok(Order {
            id: Uuid::parse_str(&self.id).map_err(|e| ServerError::malformed("id", e.to_string()))?,
            partner_id: Uuid::parse_str(&self.partner_id)
                .map_err(|e| ServerError::malformed("partner_id", e.to_string()))?,
            status: OrderStatus::try_from(self.status as i32)
                .map_err(|e| ServerError::malformed("status", e))?,
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

const SELECT: &str = "SELECT id, partner_id, status, order_date, delivery_date, comment, \
    created_at, updated_at, version, deleted_at FROM orders WHERE id = ?1";

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Fetches an order regardless of soft-delete status — the resolver
    /// always needs full visibility to compute conflicts correctly.
    pub async fn get(&self, id: Uuid) -> ServerResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(SELECT)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRow::into_order).transpose()
    }

    pub async fn get_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> ServerResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(SELECT)
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(OrderRow::into_order).transpose()
    }

    pub async fn get_all(&self) -> ServerResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, partner_id, status, order_date, delivery_date, comment, \
             created_at, updated_at, version, deleted_at FROM orders WHERE deleted_at IS NULL \
             ORDER BY delivery_date ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// Inserts a brand-new order with `version = 1`, accepting the
    /// client-chosen id verbatim (§9 Open Question #1).
    pub async fn insert_create(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        data: &Value,
    ) -> ServerResult<Order> {
        let obj = data
            .as_object()
            .ok_or_else(|| ServerError::malformed("data", "order CREATE data is not an object"))?;
        let partner_id = obj
            .get("partner_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ServerError::malformed("partner_id", "missing or invalid"))?;
        let delivery_date = obj
            .get("delivery_date")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .ok_or_else(|| ServerError::malformed("delivery_date", "missing or invalid"))?;
        let status = obj
            .get("status")
            .and_then(|v| v.as_i64())
            .and_then(|c| OrderStatus::try_from(c as i32).ok())
            .unwrap_or_default();
        let order_date = obj
            .get("order_date")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let comment = obj.get("comment").and_then(|v| v.as_str()).map(str::to_string);
        let now = Utc::now();

        let order = Order {
            id,
            partner_id,
            status,
            order_date,
            delivery_date,
            comment,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, partner_id, status, order_date, delivery_date, comment,
                created_at, updated_at, version, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, NULL)
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
        .execute(&mut **tx)
        .await?;

        Ok(order)
    }

    /// Applies the accepted field set (the patch minus any field the
    /// server overruled) and bumps to `new_version`.
    pub async fn apply_update(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        merged: &Value,
        new_version: i64,
    ) -> ServerResult<()> {
        let obj = merged.as_object();
        let status = obj.and_then(|o| o.get("status")).and_then(|v| v.as_i64());
        let comment = obj.and_then(|o| o.get("comment")).and_then(|v| v.as_str());
        let delivery_date = obj
            .and_then(|o| o.get("delivery_date"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let order_date = obj
            .and_then(|o| o.get("order_date"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE orders SET
                status = COALESCE(?2, status),
                comment = COALESCE(?3, comment),
                delivery_date = COALESCE(?4, delivery_date),
                order_date = COALESCE(?5, order_date),
                updated_at = ?6,
                version = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(status)
        .bind(comment)
        .bind(delivery_date)
        .bind(order_date)
        .bind(now)
        .bind(new_version)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Soft-deletes and bumps to `new_version`.
    pub async fn soft_delete(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        new_version: i64,
    ) -> ServerResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE orders SET deleted_at = ?2, updated_at = ?2, version = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(now)
            .bind(new_version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// Serializes an [`Order`] the way change-log `data` and snapshot payloads
/// expect: plain field bag, ISO-8601 timestamps.
pub fn order_to_value(order: &Order) -> Value {
    serde_json::to_value(order).unwrap_or(Value::Null)
}
