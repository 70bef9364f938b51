//! # Pull Engine
//!
//! Ingests the server's change log and rebases local pending outbox work
//! on top of it (§4.4). Two independent modes, each guarded by its own
//! `isSyncing` flag: the one-time [`PullEngine::run_initial_snapshot_if_needed`]
//! and the steady-state [`PullEngine::run_incremental`]. The Orchestrator's
//! FIFO queue is the authoritative serializer against the push engine
//! (§5); these flags are a defensive second line, per §9.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use sync_core::{EntityType, OpType, OutboxRecord, Order, OrderLine, OrderStatus};
use sync_store::Database;

use crate::error::{SyncError, SyncResult};
use crate::invalidation::CacheInvalidator;
use crate::protocol::PullLogEntry;
use crate::transport::SyncTransport;

/// Outcome of one pull invocation, reported to the orchestrator for
/// status bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullSummary {
    pub snapshot_ran: bool,
    pub applied: usize,
}

pub struct PullEngine {
    db: Database,
    transport: SyncTransport,
    invalidator: Arc<dyn CacheInvalidator>,
    page_size: u32,
    snapshot_syncing: AtomicBool,
    incremental_syncing: AtomicBool,
}

impl PullEngine {
    pub fn new(
        db: Database,
        transport: SyncTransport,
        invalidator: Arc<dyn CacheInvalidator>,
        page_size: u32,
    ) -> Self {
        PullEngine {
            db,
            transport,
            invalidator,
            page_size,
            snapshot_syncing: AtomicBool::new(false),
            incremental_syncing: AtomicBool::new(false),
        }
    }

    /// Runs the initial snapshot iff `last_snapshot_timestamp` is absent.
    /// Returns whether it actually ran.
    pub async fn run_initial_snapshot_if_needed(&self) -> SyncResult<bool> {
        if self
            .db
            .metadata()
            .get_last_snapshot_timestamp()
            .await?
            .is_some()
        {
            return Ok(false);
        }
        if self.snapshot_syncing.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let result = self.run_initial_snapshot().await;
        self.snapshot_syncing.store(false, Ordering::SeqCst);
        result.map(|()| true)
    }

    async fn run_initial_snapshot(&self) -> SyncResult<()> {
        let snapshot = self.transport.snapshot().await?;

        self.db.partners().bulk_put(&snapshot.partners).await?;
        self.db.products().bulk_put(&snapshot.products).await?;
        self.db.units().bulk_put(&snapshot.units).await?;

        let orders: Vec<Order> = snapshot.orders.into_iter().map(Order::from).collect();
        self.db.orders().bulk_put(&orders).await?;

        let lines: Vec<OrderLine> = snapshot.order_lines.into_iter().map(OrderLine::from).collect();
        self.db.order_lines().bulk_put(&lines).await?;

        self.db
            .metadata()
            .set_last_snapshot_timestamp(Utc::now().timestamp_millis())
            .await?;

        self.invalidator.invalidate_reference_data();
        let all_order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        self.invalidator.invalidate_orders(&all_order_ids);
        Ok(())
    }

    /// Drains the server change log from `last_sync_id` to the latest
    /// entry, rebasing or applying each one (§4.4).
    pub async fn run_incremental(&self) -> SyncResult<PullSummary> {
        if self.incremental_syncing.swap(true, Ordering::SeqCst) {
            return Ok(PullSummary::default());
        }
        let result = self.run_incremental_inner().await;
        self.incremental_syncing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_incremental_inner(&self) -> SyncResult<PullSummary> {
        let mut cursor = self.db.metadata().get_last_sync_id().await?.unwrap_or(0);

        let pending = self.db.outbox().get_all_pending().await?;
        let mut pending_by_entity: HashMap<(EntityType, Uuid), Vec<OutboxRecord>> = HashMap::new();
        for op in pending {
            pending_by_entity.entry(op.group_key()).or_default().push(op);
        }

        let mut applied = 0usize;
        let mut touched_orders: HashSet<Uuid> = HashSet::new();

        loop {
            let page = self.transport.pull(cursor, self.page_size).await?;
            if page.operations.is_empty() {
                break;
            }

            for entry in &page.operations {
                let key = (entry.entity_type, entry.entity_id);
                if let Some(local_ops) = pending_by_entity.get(&key) {
                    self.rebase(entry, local_ops, &mut touched_orders).await?;
                } else {
                    self.apply(entry, &mut touched_orders).await?;
                }
                applied += 1;
                cursor = cursor.max(entry.sync_id);
            }

            self.db.metadata().set_last_sync_id(cursor).await?;

            if !page.has_more {
                break;
            }
        }

        if !touched_orders.is_empty() {
            let ids: Vec<Uuid> = touched_orders.into_iter().collect();
            self.invalidator.invalidate_orders(&ids);
        }

        Ok(PullSummary {
            snapshot_ran: false,
            applied,
        })
    }

    // -----------------------------------------------------------------
    // Apply: project one server log entry directly onto local state.
    // -----------------------------------------------------------------

    async fn apply(&self, entry: &PullLogEntry, touched: &mut HashSet<Uuid>) -> SyncResult<()> {
        match (entry.entity_type, entry.operation_type) {
            (EntityType::Order, OpType::Create) => {
                self.apply_order_create(entry.entity_id, &entry.data).await?;
                touched.insert(entry.entity_id);
            }
            (EntityType::Order, OpType::Update) => {
                self.apply_order_update(entry.entity_id, &entry.data).await?;
                touched.insert(entry.entity_id);
            }
            (EntityType::Order, OpType::Delete) => {
                self.apply_order_delete(entry.entity_id, &entry.data).await?;
                touched.insert(entry.entity_id);
            }
            (EntityType::OrderLine, OpType::Create) => {
                let order_id = self
                    .apply_order_line_create(entry.entity_id, &entry.data)
                    .await?;
                touched.insert(order_id);
            }
            (EntityType::OrderLine, OpType::Update) => {
                self.apply_order_line_update(entry.entity_id, &entry.data).await?;
                if let Some(order_id) = self.order_line_order_id(entry.entity_id, &entry.data).await? {
                    touched.insert(order_id);
                }
            }
            (EntityType::OrderLine, OpType::Delete) => {
                let order_id = self.order_line_order_id(entry.entity_id, &entry.data).await?;
                self.apply_order_line_delete(entry.entity_id, &entry.data).await?;
                if let Some(order_id) = order_id {
                    touched.insert(order_id);
                }
            }
        }
        Ok(())
    }

    async fn apply_order_create(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let obj = data
            .as_object()
            .ok_or_else(|| SyncError::Protocol("order CREATE data is not an object".into()))?;
        let partner_id = parse_uuid(obj.get("partner_id"))
            .ok_or_else(|| SyncError::Protocol("order CREATE missing partner_id".into()))?;
        let delivery_date = parse_dt(obj.get("delivery_date"))
            .ok_or_else(|| SyncError::Protocol("order CREATE missing delivery_date".into()))?;
        let status = obj
            .get("status")
            .and_then(|v| v.as_i64())
            .and_then(|c| OrderStatus::try_from(c as i32).ok())
            .unwrap_or_default();
        let now = Utc::now();
        let order = Order {
            id: entity_id,
            partner_id,
            status,
            order_date: parse_dt(obj.get("order_date")),
            delivery_date,
            comment: obj.get("comment").and_then(|v| v.as_str()).map(str::to_string),
            created_at: parse_dt(obj.get("created_at")).unwrap_or(now),
            updated_at: parse_dt(obj.get("updated_at")).unwrap_or(now),
            version: obj.get("version").and_then(|v| v.as_i64()).unwrap_or(1),
            deleted_at: None,
        };
        self.db.orders().put(&order).await?;
        Ok(())
    }

    async fn apply_order_update(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let Some(current) = self.db.orders().get_including_deleted(entity_id).await? else {
            warn!(%entity_id, "order UPDATE for unknown entity, skipping (CREATE not yet observed)");
            return Ok(());
        };
        let new_version = data.get("version").and_then(|v| v.as_i64()).unwrap_or(current.version);
        self.db.orders().apply_patch(entity_id, data, new_version).await?;
        Ok(())
    }

    async fn apply_order_delete(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let current = self.db.orders().get_including_deleted(entity_id).await?;
        let new_version = data
            .get("version")
            .and_then(|v| v.as_i64())
            .unwrap_or_else(|| current.map(|o| o.version + 1).unwrap_or(1));
        self.db.orders().soft_delete(entity_id, new_version).await?;
        self.db.order_lines().cascade_delete_for_order(entity_id).await?;
        Ok(())
    }

    async fn apply_order_line_create(&self, entity_id: Uuid, data: &Value) -> SyncResult<Uuid> {
        let obj = data
            .as_object()
            .ok_or_else(|| SyncError::Protocol("order_line CREATE data is not an object".into()))?;
        let order_id = parse_uuid(obj.get("order_id"))
            .ok_or_else(|| SyncError::Protocol("order_line CREATE missing order_id".into()))?;
        let product_id = parse_uuid(obj.get("product_id"))
            .ok_or_else(|| SyncError::Protocol("order_line CREATE missing product_id".into()))?;
        let unit_id = parse_uuid(obj.get("unit_id"))
            .ok_or_else(|| SyncError::Protocol("order_line CREATE missing unit_id".into()))?;
        let quantity = obj
            .get("quantity")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SyncError::Protocol("order_line CREATE missing quantity".into()))?;
        let price_cents = obj.get("price_cents").and_then(|v| v.as_i64()).unwrap_or(0);
        let now = Utc::now();
        let line = OrderLine {
            id: entity_id,
            order_id,
            product_id,
            unit_id,
            quantity,
            price_cents,
            comment: obj.get("comment").and_then(|v| v.as_str()).map(str::to_string),
            created_at: parse_dt(obj.get("created_at")).unwrap_or(now),
            updated_at: parse_dt(obj.get("updated_at")).unwrap_or(now),
            version: obj.get("version").and_then(|v| v.as_i64()).unwrap_or(1),
            deleted_at: None,
        };
        self.db.order_lines().put(&line).await?;
        Ok(order_id)
    }

    async fn apply_order_line_update(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let Some(current) = self.db.order_lines().get_including_deleted(entity_id).await? else {
            warn!(%entity_id, "order_line UPDATE for unknown entity, skipping (CREATE not yet observed)");
            return Ok(());
        };
        let new_version = data.get("version").and_then(|v| v.as_i64()).unwrap_or(current.version);
        self.db.order_lines().apply_patch(entity_id, data, new_version).await?;
        Ok(())
    }

    async fn apply_order_line_delete(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let current = self.db.order_lines().get_including_deleted(entity_id).await?;
        let new_version = data
            .get("version")
            .and_then(|v| v.as_i64())
            .unwrap_or_else(|| current.map(|l| l.version + 1).unwrap_or(1));
        self.db.order_lines().soft_delete(entity_id, new_version).await?;
        Ok(())
    }

    /// Resolves the parent order id for cache invalidation: from the
    /// op's own `data.order_id` if present, else the local row.
    async fn order_line_order_id(&self, entity_id: Uuid, data: &Value) -> SyncResult<Option<Uuid>> {
        if let Some(order_id) = parse_uuid(data.as_object().and_then(|o| o.get("order_id"))) {
            return Ok(Some(order_id));
        }
        Ok(self
            .db
            .order_lines()
            .get_including_deleted(entity_id)
            .await?
            .map(|l| l.order_id))
    }

    // -----------------------------------------------------------------
    // Rebase: apply the server op, then re-project local pending intent
    // onto the entity row only. The outbox itself is never touched here.
    // -----------------------------------------------------------------

    async fn rebase(
        &self,
        entry: &PullLogEntry,
        local_ops: &[OutboxRecord],
        touched: &mut HashSet<Uuid>,
    ) -> SyncResult<()> {
        self.apply(entry, touched).await?;

        if entry.operation_type == OpType::Delete {
            warn!(
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                "server deleted an entity with local pending ops; they will be rejected on next push"
            );
            return Ok(());
        }

        for op in local_ops {
            match (entry.entity_type, op.op_type) {
                (EntityType::Order, OpType::Update) => {
                    self.reapply_order_update(entry.entity_id, &op.data).await?
                }
                (EntityType::Order, OpType::Delete) => self.reapply_order_delete(entry.entity_id).await?,
                (EntityType::OrderLine, OpType::Update) => {
                    self.reapply_order_line_update(entry.entity_id, &op.data).await?
                }
                (EntityType::OrderLine, OpType::Delete) => {
                    self.reapply_order_line_delete(entry.entity_id).await?
                }
                (_, OpType::Create) => {
                    // A local CREATE can only be the first op for an entity the
                    // server has never seen; it can't coexist with an incoming
                    // server op for the same id, so there is nothing to re-apply.
                }
            }
        }
        Ok(())
    }

    async fn reapply_order_update(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let current = self
            .db
            .orders()
            .get_including_deleted(entity_id)
            .await?
            .ok_or_else(|| SyncError::Internal("order missing after server apply during rebase".into()))?;
        self.db.orders().apply_patch(entity_id, data, current.version).await?;
        Ok(())
    }

    async fn reapply_order_delete(&self, entity_id: Uuid) -> SyncResult<()> {
        let current = self
            .db
            .orders()
            .get_including_deleted(entity_id)
            .await?
            .ok_or_else(|| SyncError::Internal("order missing after server apply during rebase".into()))?;
        self.db.orders().soft_delete(entity_id, current.version).await?;
        self.db.order_lines().cascade_delete_for_order(entity_id).await?;
        Ok(())
    }

    async fn reapply_order_line_update(&self, entity_id: Uuid, data: &Value) -> SyncResult<()> {
        let current = self
            .db
            .order_lines()
            .get_including_deleted(entity_id)
            .await?
            .ok_or_else(|| {
                SyncError::Internal("order_line missing after server apply during rebase".into())
            })?;
        self.db
            .order_lines()
            .apply_patch(entity_id, data, current.version)
            .await?;
        Ok(())
    }

    async fn reapply_order_line_delete(&self, entity_id: Uuid) -> SyncResult<()> {
        let current = self
            .db
            .order_lines()
            .get_including_deleted(entity_id)
            .await?
            .ok_or_else(|| {
                SyncError::Internal("order_line missing after server apply during rebase".into())
            })?;
        self.db.order_lines().soft_delete(entity_id, current.version).await?;
        Ok(())
    }
}

fn parse_uuid(value: Option<&Value>) -> Option<Uuid> {
    value.and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok())
}

fn parse_dt(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::NoOpInvalidator;
    use serde_json::json;
    use sync_store::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn engine(db: Database) -> PullEngine {
        PullEngine::new(
            db,
            SyncTransport::new(&crate::config::SyncConfig::new("http://127.0.0.1:1")).unwrap(),
            Arc::new(NoOpInvalidator),
            100,
        )
    }

    #[tokio::test]
    async fn apply_create_inserts_order() {
        let db = test_db().await;
        let engine = engine(db.clone());
        let entity_id = Uuid::new_v4();
        let partner_id = Uuid::new_v4();
        let data = json!({
            "partner_id": partner_id.to_string(),
            "status": 0,
            "delivery_date": Utc::now().to_rfc3339(),
            "comment": "hello",
            "version": 1,
        });
        let entry = PullLogEntry {
            sync_id: 1,
            entity_type: EntityType::Order,
            entity_id,
            operation_type: OpType::Create,
            data,
            timestamp: Utc::now(),
        };
        let mut touched = HashSet::new();
        engine.apply(&entry, &mut touched).await.unwrap();

        let order = db.orders().get(entity_id).await.unwrap().unwrap();
        assert_eq!(order.partner_id, partner_id);
        assert_eq!(order.comment.as_deref(), Some("hello"));
        assert!(touched.contains(&entity_id));
    }

    #[tokio::test]
    async fn apply_update_skips_when_entity_unknown() {
        let db = test_db().await;
        let engine = engine(db.clone());
        let entry = PullLogEntry {
            sync_id: 1,
            entity_type: EntityType::Order,
            entity_id: Uuid::new_v4(),
            operation_type: OpType::Update,
            data: json!({"status": 1}),
            timestamp: Utc::now(),
        };
        let mut touched = HashSet::new();
        // Should not error even though the order was never created locally.
        engine.apply(&entry, &mut touched).await.unwrap();
    }

    #[tokio::test]
    async fn apply_delete_cascades_to_order_lines() {
        let db = test_db().await;
        let engine = engine(db.clone());

        let order_id = Uuid::new_v4();
        let partner_id = Uuid::new_v4();
        let create_data = json!({
            "partner_id": partner_id.to_string(),
            "status": 0,
            "delivery_date": Utc::now().to_rfc3339(),
            "version": 1,
        });
        let mut touched = HashSet::new();
        engine
            .apply(
                &PullLogEntry {
                    sync_id: 1,
                    entity_type: EntityType::Order,
                    entity_id: order_id,
                    operation_type: OpType::Create,
                    data: create_data,
                    timestamp: Utc::now(),
                },
                &mut touched,
            )
            .await
            .unwrap();

        let line_id = Uuid::new_v4();
        let line_data = json!({
            "order_id": order_id.to_string(),
            "product_id": Uuid::new_v4().to_string(),
            "unit_id": Uuid::new_v4().to_string(),
            "quantity": 2,
            "price_cents": 500,
            "version": 1,
        });
        engine
            .apply(
                &PullLogEntry {
                    sync_id: 2,
                    entity_type: EntityType::OrderLine,
                    entity_id: line_id,
                    operation_type: OpType::Create,
                    data: line_data,
                    timestamp: Utc::now(),
                },
                &mut touched,
            )
            .await
            .unwrap();

        engine
            .apply(
                &PullLogEntry {
                    sync_id: 3,
                    entity_type: EntityType::Order,
                    entity_id: order_id,
                    operation_type: OpType::Delete,
                    data: json!({"version": 2}),
                    timestamp: Utc::now(),
                },
                &mut touched,
            )
            .await
            .unwrap();

        let order = db.orders().get_including_deleted(order_id).await.unwrap().unwrap();
        assert!(order.deleted_at.is_some());
        let line = db
            .order_lines()
            .get_including_deleted(line_id)
            .await
            .unwrap()
            .unwrap();
        assert!(line.deleted_at.is_some());
    }
}
