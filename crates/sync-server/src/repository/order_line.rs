//! # Server-Side Order Line Repository
//!
//! No outbox here, mirroring `repository::order`. Cascading soft-delete
//! of lines follows their parent order directly at the resolver's request.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use sync_core::OrderLine;

#[derive(Debug, Clone, sqlx::FromRow)]
struct OrderLineRow {
    id: String,
    order_id: String,
    product_id: String,
    unit_id: String,
    quantity: i64,
    price_cents: i64,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    deleted_at: Option<DateTime<Utc>>,
}

impl OrderLineRow {
    fn into_line(self) -> ServerResult<OrderLine> {
        Ok(OrderLine {
            id: Uuid::parse_str(&self.id).map_err(|e| ServerError::malformed("id", e.to_string()))?,
            order_id: Uuid::parse_str(&self.order_id)
                .map_err(|e| ServerError::malformed("order_id", e.to_string()))?,
            product_id: Uuid::parse_str(&self.product_id)
                .map_err(|e| ServerError::malformed("product_id", e.to_string()))?,
            unit_id: Uuid::parse_str(&self.unit_id)
                .map_err(|e| ServerError::malformed("unit_id", e.to_string()))?,
            quantity: self.quantity,
            price_cents: self.price_cents,
            comment: self.comment,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
            deleted_at: self.deleted_at,
        })
    }
}

const SELECT: &str = "SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment, \
    created_at, updated_at, version, deleted_at FROM order_lines WHERE id = ?1";

#[derive(Debug, Clone)]
pub struct OrderLineRepository {
    pool: SqlitePool,
}

impl OrderLineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderLineRepository { pool }
    }

    pub async fn get(&self, id: Uuid) -> ServerResult<Option<OrderLine>> {
        let row = sqlx::query_as::<_, OrderLineRow>(SELECT)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderLineRow::into_line).transpose()
    }

    pub async fn get_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> ServerResult<Option<OrderLine>> {
        let row = sqlx::query_as::<_, OrderLineRow>(SELECT)
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(OrderLineRow::into_line).transpose()
    }

    pub async fn where_order_id(&self, order_id: Uuid) -> ServerResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment, \
             created_at, updated_at, version, deleted_at FROM order_lines WHERE order_id = ?1 \
             AND deleted_at IS NULL",
        )
        .bind(order_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderLineRow::into_line).collect()
    }

    pub async fn get_all(&self) -> ServerResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment, \
             created_at, updated_at, version, deleted_at FROM order_lines WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderLineRow::into_line).collect()
    }

    pub async fn insert_create(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        data: &Value,
    ) -> ServerResult<OrderLine> {
        let obj = data.as_object().ok_or_else(|| {
            ServerError::malformed("data", "order_line CREATE data is not an object")
        })?;
        let order_id = obj
            .get("order_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ServerError::malformed("order_id", "missing or invalid"))?;
        let product_id = obj
            .get("product_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ServerError::malformed("product_id", "missing or invalid"))?;
        let unit_id = obj
            .get("unit_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ServerError::malformed("unit_id", "missing or invalid"))?;
        let quantity = obj
            .get("quantity")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ServerError::malformed("quantity", "missing or invalid"))?;
        let price_cents = obj
            .get("price_cents")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ServerError::malformed("price_cents", "missing or invalid"))?;
        let comment = obj.get("comment").and_then(|v| v.as_str()).map(str::to_string);
        let now = Utc::now();

        let line = OrderLine {
            id,
            order_id,
            product_id,
            unit_id,
            quantity,
            price_cents,
            comment,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, product_id, unit_id, quantity, price_cents, comment,
                created_at, updated_at, version, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, NULL)
            "#,
        )
        .bind(line.id.to_string())
        .bind(line.order_id.to_string())
        .bind(line.product_id.to_string())
        .bind(line.unit_id.to_string())
        .bind(line.quantity)
        .bind(line.price_cents)
        .bind(&line.comment)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(line)
    }

    pub async fn apply_update(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        merged: &Value,
        new_version: i64,
    ) -> ServerResult<()> {
        let obj = merged.as_object();
        let quantity = obj.and_then(|o| o.get("quantity")).and_then(|v| v.as_i64());
        let price_cents = obj.and_then(|o| o.get("price_cents")).and_then(|v| v.as_i64());
        let comment = obj.and_then(|o| o.get("comment")).and_then(|v| v.as_str());
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE order_lines SET
                quantity = COALESCE(?2, quantity),
                price_cents = COALESCE(?3, price_cents),
                comment = COALESCE(?4, comment),
                updated_at = ?5,
                version = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(quantity)
        .bind(price_cents)
        .bind(comment)
        .bind(now)
        .bind(new_version)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn soft_delete(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        new_version: i64,
    ) -> ServerResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE order_lines SET deleted_at = ?2, updated_at = ?2, version = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(now)
        .bind(new_version)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Cascades a parent order's soft-delete onto every one of its lines,
    /// bumping each line's own version so clients rebasing against it see
    /// a genuine version change.
    pub async fn cascade_delete_for_order(
        tx: &mut Transaction<'_, Sqlite>,
        order_id: Uuid,
    ) -> ServerResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE order_lines SET deleted_at = ?2, updated_at = ?2, version = version + 1 \
             WHERE order_id = ?1 AND deleted_at IS NULL",
        )
        .bind(order_id.to_string())
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

pub fn order_line_to_value(line: &OrderLine) -> Value {
    serde_json::to_value(line).unwrap_or(Value::Null)
}
