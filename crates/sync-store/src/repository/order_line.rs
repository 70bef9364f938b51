//! # Order Line Repository
//!
//! Entity-facing CRUD for [`OrderLine`], mirroring [`OrderRepository`]'s
//! outbox-emitting writes. Cascading soft-delete when a parent `Order` is
//! deleted is modelled as a plain id reference, not a bidirectional
//! pointer graph (§9).

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox::OutboxRepository;
use sync_core::{EntityType, OpType, OrderLine};

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
    fn into_line(self) -> DbResult<OrderLine> {
        Ok(OrderLine {
            id: Uuid::parse_str(&self.id).map_err(|e| DbError::malformed("id", e.to_string()))?,
            order_id: Uuid::parse_str(&self.order_id)
                .map_err(|e| DbError::malformed("order_id", e.to_string()))?,
            product_id: Uuid::parse_str(&self.product_id)
                .map_err(|e| DbError::malformed("product_id", e.to_string()))?,
            unit_id: Uuid::parse_str(&self.unit_id)
                .map_err(|e| DbError::malformed("unit_id", e.to_string()))?,
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

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: i64,
    pub price_cents: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderLinePatch {
    pub quantity: Option<i64>,
    pub price_cents: Option<i64>,
    pub comment: Option<Option<String>>,
}

fn patch_to_json(patch: &OrderLinePatch) -> Value {
    let mut map = serde_json::Map::new();
    if let Some(q) = patch.quantity {
        map.insert("quantity".into(), json!(q));
    }
    if let Some(p) = patch.price_cents {
        map.insert("price_cents".into(), json!(p));
    }
    if let Some(c) = &patch.comment {
        map.insert("comment".into(), json!(c));
    }
    Value::Object(map)
}

#[derive(Debug, Clone)]
pub struct OrderLineRepository {
    pool: SqlitePool,
}

impl OrderLineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderLineRepository { pool }
    }

    pub async fn get(&self, id: Uuid) -> DbResult<Option<OrderLine>> {
        let row = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment,
                   created_at, updated_at, version, deleted_at
            FROM order_lines WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderLineRow::into_line).transpose()
    }

    pub async fn get_including_deleted(&self, id: Uuid) -> DbResult<Option<OrderLine>> {
        let row = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment,
                   created_at, updated_at, version, deleted_at
            FROM order_lines WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderLineRow::into_line).transpose()
    }

    /// Lines for an order (the `order_lines(order_id)` index), excluding
    /// soft-deleted rows.
    pub async fn where_order_id(&self, order_id: Uuid) -> DbResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r#"
            SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment,
                   created_at, updated_at, version, deleted_at
            FROM order_lines WHERE order_id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(order_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderLineRow::into_line).collect()
    }

    /// All lines for an order regardless of soft-delete, used by cascade.
    pub async fn where_order_id_including_deleted(&self, order_id: Uuid) -> DbResult<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment, created_at, updated_at, version, deleted_at FROM order_lines WHERE order_id = ?1",
        )
        .bind(order_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderLineRow::into_line).collect()
    }

    pub async fn create(&self, fields: NewOrderLine) -> DbResult<OrderLine> {
        let now = Utc::now();
        let line = OrderLine {
            id: Uuid::now_v7(),
            order_id: fields.order_id,
            product_id: fields.product_id,
            unit_id: fields.unit_id,
            quantity: fields.quantity,
            price_cents: fields.price_cents,
            comment: fields.comment,
            created_at: now,
            updated_at: now,
            version: 1,
            deleted_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, product_id, unit_id, quantity, price_cents, comment,
                created_at, updated_at, version, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)
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
        .bind(line.version)
        .execute(&mut *tx)
        .await?;

        let data = serde_json::to_value(&line)?;
        OutboxRepository::append_in_tx(&mut tx, EntityType::OrderLine, line.id, OpType::Create, data)
            .await?;

        tx.commit().await?;
        Ok(line)
    }

    pub async fn update(&self, id: Uuid, patch: OrderLinePatch) -> DbResult<OrderLine> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment, created_at, updated_at, version, deleted_at FROM order_lines WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("order_line", id.to_string()))?;
        let current = row.into_line()?;
        if current.deleted_at.is_some() {
            return Err(DbError::malformed("order_line", "already deleted"));
        }

        let now = Utc::now();
        let updated = OrderLine {
            quantity: patch.quantity.unwrap_or(current.quantity),
            price_cents: patch.price_cents.unwrap_or(current.price_cents),
            comment: patch.comment.clone().unwrap_or_else(|| current.comment.clone()),
            updated_at: now,
            version: current.version + 1,
            ..current.clone()
        };

        sqlx::query(
            r#"
            UPDATE order_lines SET
                quantity = ?2, price_cents = ?3, comment = ?4, updated_at = ?5, version = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(updated.quantity)
        .bind(updated.price_cents)
        .bind(&updated.comment)
        .bind(updated.updated_at)
        .bind(updated.version)
        .execute(&mut *tx)
        .await?;

        let mut data = patch_to_json(&patch);
        data.as_object_mut()
            .unwrap()
            .insert("version".into(), json!(current.version));
        OutboxRepository::append_in_tx(&mut tx, EntityType::OrderLine, id, OpType::Update, data)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> DbResult<OrderLine> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, unit_id, quantity, price_cents, comment, created_at, updated_at, version, deleted_at FROM order_lines WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("order_line", id.to_string()))?;
        let current = row.into_line()?;
        if current.deleted_at.is_some() {
            return Err(DbError::malformed("order_line", "already deleted"));
        }

        let now = Utc::now();
        let deleted = OrderLine {
            deleted_at: Some(now),
            updated_at: now,
            version: current.version + 1,
            ..current.clone()
        };

        sqlx::query("UPDATE order_lines SET deleted_at = ?2, updated_at = ?2, version = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(now)
            .bind(deleted.version)
            .execute(&mut *tx)
            .await?;

        let data = json!({ "version": current.version, "order_id": current.order_id });
        OutboxRepository::append_in_tx(&mut tx, EntityType::OrderLine, id, OpType::Delete, data)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    // -------------------------------------------------------------------
    // Sync-internal
    // -------------------------------------------------------------------

    pub async fn put(&self, line: &OrderLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, product_id, unit_id, quantity, price_cents, comment,
                created_at, updated_at, version, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                order_id = excluded.order_id, product_id = excluded.product_id,
                unit_id = excluded.unit_id, quantity = excluded.quantity,
                price_cents = excluded.price_cents, comment = excluded.comment,
                updated_at = excluded.updated_at, version = excluded.version,
                deleted_at = excluded.deleted_at
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
        .bind(line.version)
        .bind(line.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn bulk_put(&self, lines: &[OrderLine]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, order_id, product_id, unit_id, quantity, price_cents, comment,
                    created_at, updated_at, version, deleted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    order_id = excluded.order_id, product_id = excluded.product_id,
                    unit_id = excluded.unit_id, quantity = excluded.quantity,
                    price_cents = excluded.price_cents, comment = excluded.comment,
                    updated_at = excluded.updated_at, version = excluded.version,
                    deleted_at = excluded.deleted_at
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
            .bind(line.version)
            .bind(line.deleted_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Projects the writable field set for OrderLine (§4.4 apply/rebase).
    pub async fn apply_patch(&self, id: Uuid, data: &Value, new_version: i64) -> DbResult<()> {
        let obj = data.as_object();
        let quantity = obj.and_then(|o| o.get("quantity")).and_then(|v| v.as_i64());
        let price_cents = obj.and_then(|o| o.get("price_cents")).and_then(|v| v.as_i64());
        let comment = obj.and_then(|o| o.get("comment")).cloned();
        let updated_at = obj
            .and_then(|o| o.get("updated_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

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
        .bind(comment.map(|v| v.as_str().map(|s| s.to_string())))
        .bind(updated_at)
        .bind(new_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_field(&self, id: Uuid, field: &str, value: &Value) -> DbResult<()> {
        match field {
            "quantity" => {
                if let Some(v) = value.as_i64() {
                    sqlx::query("UPDATE order_lines SET quantity = ?2 WHERE id = ?1")
                        .bind(id.to_string())
                        .bind(v)
                        .execute(&self.pool)
                        .await?;
                }
            }
            "price_cents" => {
                if let Some(v) = value.as_i64() {
                    sqlx::query("UPDATE order_lines SET price_cents = ?2 WHERE id = ?1")
                        .bind(id.to_string())
                        .bind(v)
                        .execute(&self.pool)
                        .await?;
                }
            }
            "comment" => {
                sqlx::query("UPDATE order_lines SET comment = ?2 WHERE id = ?1")
                    .bind(id.to_string())
                    .bind(value.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    pub async fn update_version(&self, id: Uuid, new_version: i64) -> DbResult<()> {
        sqlx::query("UPDATE order_lines SET version = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(new_version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn soft_delete(&self, id: Uuid, new_version: i64) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE order_lines SET deleted_at = ?2, version = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(now)
            .bind(new_version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cascades a parent order's soft-delete onto every one of its lines
    /// (§4.4 apply, CREATE/UPDATE/DELETE by op_type: Order DELETE cascade).
    pub async fn cascade_delete_for_order(&self, order_id: Uuid) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE order_lines SET deleted_at = ?2, version = version + 1 WHERE order_id = ?1 AND deleted_at IS NULL",
        )
        .bind(order_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn restore(&self, id: Uuid, new_version: i64) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE order_lines SET deleted_at = NULL, version = ?2, updated_at = ?3 WHERE id = ?1",
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
    use crate::repository::order::NewOrder;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_cascade_delete() {
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

        let line = db
            .order_lines()
            .create(NewOrderLine {
                order_id: order.id,
                product_id: Uuid::new_v4(),
                unit_id: Uuid::new_v4(),
                quantity: 3,
                price_cents: 500,
                comment: None,
            })
            .await
            .unwrap();

        db.order_lines()
            .cascade_delete_for_order(order.id)
            .await
            .unwrap();
        assert!(db.order_lines().get(line.id).await.unwrap().is_none());
    }
}
