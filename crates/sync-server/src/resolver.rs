//! # Conflict Resolver
//!
//! Applies one pushed operation at a time, each inside its own
//! transaction: CREATE always succeeds, UPDATE/DELETE compare
//! `expected_version` against the current row and either apply cleanly or
//! resolve a conflict with server-wins-on-overlap field merge.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::changelog::ChangeLogRepository;
use crate::error::{ServerError, ServerResult};
use crate::pool::ServerDatabase;
use crate::protocol::{ConflictWinner, FieldConflict, PushOpResult, PushOperation, PushResultStatus};
use crate::repository::order::{order_to_value, OrderRepository};
use crate::repository::order_line::{order_line_to_value, OrderLineRepository};
use sync_core::{EntityType, OpType};

/// Resolves one pushed operation against the authoritative store,
/// returning the per-op result the client's push engine expects.
pub async fn resolve_operation(db: &ServerDatabase, op: PushOperation) -> ServerResult<PushOpResult> {
    let outcome = match (op.entity_type, op.operation_type) {
        (EntityType::Order, OpType::Create) => resolve_order_create(db, &op).await,
        (EntityType::Order, OpType::Update) => resolve_order_update(db, &op).await,
        (EntityType::Order, OpType::Delete) => resolve_order_delete(db, &op).await,
        (EntityType::OrderLine, OpType::Create) => resolve_order_line_create(db, &op).await,
        (EntityType::OrderLine, OpType::Update) => resolve_order_line_update(db, &op).await,
        (EntityType::OrderLine, OpType::Delete) => resolve_order_line_delete(db, &op).await,
    };

    match outcome {
        Ok(result) => Ok(result),
        Err(ServerError::NotFound { .. }) => Ok(PushOpResult {
            operation_id: op.id,
            status: PushResultStatus::Error,
            sync_id: None,
            new_version: None,
            message: Some("entity not found".to_string()),
            conflicts: None,
        }),
        Err(err) => Ok(PushOpResult {
            operation_id: op.id,
            status: PushResultStatus::Error,
            sync_id: None,
            new_version: None,
            message: Some(err.to_string()),
            conflicts: None,
        }),
    }
}

fn patched_fields(data: &Value) -> Vec<String> {
    data.as_object()
        .map(|m| m.keys().cloned().filter(|k| k != "version").collect())
        .unwrap_or_default()
}

fn expected_version(op: &PushOperation) -> ServerResult<i64> {
    op.expected_version
        .or_else(|| op.data.get("version").and_then(|v| v.as_i64()))
        .ok_or_else(|| ServerError::malformed("expected_version", "missing"))
}

/// Server-wins-on-overlap merge: fields in `patch` that were also changed
/// by any log entry in `(expected_version, current_version]` are dropped
/// from the merged patch (the current row's value stands) and reported
/// as conflicts; the rest of `patch` applies cleanly.
fn merge_with_conflicts(
    patch: &Value,
    current: &Value,
    changed_fields: &std::collections::HashSet<String>,
) -> (Value, Vec<FieldConflict>) {
    let mut merged = Map::new();
    let mut conflicts = Vec::new();
    if let Some(patch_obj) = patch.as_object() {
        for (field, client_value) in patch_obj {
            if field == "version" {
                continue;
            }
            if changed_fields.contains(field) {
                let server_value = current
                    .as_object()
                    .and_then(|c| c.get(field))
                    .cloned()
                    .unwrap_or(Value::Null);
                conflicts.push(FieldConflict {
                    field: field.clone(),
                    client_value: client_value.clone(),
                    server_value: server_value.clone(),
                    winner: ConflictWinner::Server,
                });
            } else {
                merged.insert(field.clone(), client_value.clone());
            }
        }
    }
    (Value::Object(merged), conflicts)
}

async fn resolve_order_create(db: &ServerDatabase, op: &PushOperation) -> ServerResult<PushOpResult> {
    let mut tx = db.pool().begin().await?;
    let order = OrderRepository::insert_create(&mut tx, op.entity_id, &op.data).await?;
    let fields = patched_fields(&op.data);
    let sync_id = ChangeLogRepository::append(
        &mut tx,
        EntityType::Order,
        op.entity_id,
        OpType::Create,
        &order_to_value(&order),
        &fields,
        1,
    )
    .await?;
    tx.commit().await?;

    Ok(PushOpResult {
        operation_id: op.id,
        status: PushResultStatus::Success,
        sync_id: Some(sync_id),
        new_version: Some(1),
        message: None,
        conflicts: None,
    })
}

async fn resolve_order_update(db: &ServerDatabase, op: &PushOperation) -> ServerResult<PushOpResult> {
    let expected = expected_version(op)?;
    let mut tx = db.pool().begin().await?;
    let current = OrderRepository::get_in_tx(&mut tx, op.entity_id)
        .await?
        .ok_or_else(|| ServerError::not_found("order", op.entity_id.to_string()))?;

    if current.deleted_at.is_some() {
        return Err(ServerError::EntityDeleted);
    }

    let new_version = current.version + 1;
    let fields = patched_fields(&op.data);

    if expected == current.version {
        OrderRepository::apply_update(&mut tx, op.entity_id, &op.data, new_version).await?;
        let stored = OrderRepository::get_in_tx(&mut tx, op.entity_id).await?.unwrap();
        let sync_id = ChangeLogRepository::append(
            &mut tx,
            EntityType::Order,
            op.entity_id,
            OpType::Update,
            &order_to_value(&stored),
            &fields,
            new_version,
        )
        .await?;
        tx.commit().await?;
        return Ok(PushOpResult {
            operation_id: op.id,
            status: PushResultStatus::Success,
            sync_id: Some(sync_id),
            new_version: Some(new_version),
            message: None,
            conflicts: None,
        });
    }

    let changed = ChangeLogRepository::new(db.pool().clone())
        .fields_changed_in_range(EntityType::Order, op.entity_id, expected, current.version)
        .await?;
    let current_value = order_to_value(&current);
    let (merged, conflicts) = merge_with_conflicts(&op.data, &current_value, &changed);

    OrderRepository::apply_update(&mut tx, op.entity_id, &merged, new_version).await?;
    let stored = OrderRepository::get_in_tx(&mut tx, op.entity_id).await?.unwrap();
    let sync_id = ChangeLogRepository::append(
        &mut tx,
        EntityType::Order,
        op.entity_id,
        OpType::Update,
        &order_to_value(&stored),
        &fields,
        new_version,
    )
    .await?;
    tx.commit().await?;

    Ok(PushOpResult {
        operation_id: op.id,
        status: PushResultStatus::Conflict,
        sync_id: Some(sync_id),
        new_version: Some(new_version),
        message: Some("resolved against concurrent server update".to_string()),
        conflicts: Some(conflicts),
    })
}

async fn resolve_order_delete(db: &ServerDatabase, op: &PushOperation) -> ServerResult<PushOpResult> {
    let expected = expected_version(op)?;
    let mut tx = db.pool().begin().await?;
    let current = OrderRepository::get_in_tx(&mut tx, op.entity_id)
        .await?
        .ok_or_else(|| ServerError::not_found("order", op.entity_id.to_string()))?;

    if expected == current.version {
        let new_version = current.version + 1;
        OrderRepository::soft_delete(&mut tx, op.entity_id, new_version).await?;
        OrderLineRepository::cascade_delete_for_order(&mut tx, op.entity_id).await?;
        let sync_id = ChangeLogRepository::append(
            &mut tx,
            EntityType::Order,
            op.entity_id,
            OpType::Delete,
            &serde_json::json!({ "version": new_version }),
            &[],
            new_version,
        )
        .await?;
        tx.commit().await?;
        return Ok(PushOpResult {
            operation_id: op.id,
            status: PushResultStatus::Success,
            sync_id: Some(sync_id),
            new_version: Some(new_version),
            message: None,
            conflicts: None,
        });
    }

    Ok(PushOpResult {
        operation_id: op.id,
        status: PushResultStatus::Conflict,
        sync_id: None,
        new_version: Some(current.version),
        message: Some("order was modified concurrently; restore locally".to_string()),
        conflicts: None,
    })
}

async fn resolve_order_line_create(
    db: &ServerDatabase,
    op: &PushOperation,
) -> ServerResult<PushOpResult> {
    let mut tx = db.pool().begin().await?;
    let line = OrderLineRepository::insert_create(&mut tx, op.entity_id, &op.data).await?;
    let fields = patched_fields(&op.data);
    let sync_id = ChangeLogRepository::append(
        &mut tx,
        EntityType::OrderLine,
        op.entity_id,
        OpType::Create,
        &order_line_to_value(&line),
        &fields,
        1,
    )
    .await?;
    tx.commit().await?;

    Ok(PushOpResult {
        operation_id: op.id,
        status: PushResultStatus::Success,
        sync_id: Some(sync_id),
        new_version: Some(1),
        message: None,
        conflicts: None,
    })
}

async fn resolve_order_line_update(
    db: &ServerDatabase,
    op: &PushOperation,
) -> ServerResult<PushOpResult> {
    let expected = expected_version(op)?;
    let mut tx = db.pool().begin().await?;
    let current = OrderLineRepository::get_in_tx(&mut tx, op.entity_id)
        .await?
        .ok_or_else(|| ServerError::not_found("order_line", op.entity_id.to_string()))?;

    if current.deleted_at.is_some() {
        return Err(ServerError::EntityDeleted);
    }

    let new_version = current.version + 1;
    let fields = patched_fields(&op.data);

    if expected == current.version {
        OrderLineRepository::apply_update(&mut tx, op.entity_id, &op.data, new_version).await?;
        let stored = OrderLineRepository::get_in_tx(&mut tx, op.entity_id).await?.unwrap();
        let sync_id = ChangeLogRepository::append(
            &mut tx,
            EntityType::OrderLine,
            op.entity_id,
            OpType::Update,
            &order_line_to_value(&stored),
            &fields,
            new_version,
        )
        .await?;
        tx.commit().await?;
        return Ok(PushOpResult {
            operation_id: op.id,
            status: PushResultStatus::Success,
            sync_id: Some(sync_id),
            new_version: Some(new_version),
            message: None,
            conflicts: None,
        });
    }

    let changed = ChangeLogRepository::new(db.pool().clone())
        .fields_changed_in_range(EntityType::OrderLine, op.entity_id, expected, current.version)
        .await?;
    let current_value = order_line_to_value(&current);
    let (merged, conflicts) = merge_with_conflicts(&op.data, &current_value, &changed);

    OrderLineRepository::apply_update(&mut tx, op.entity_id, &merged, new_version).await?;
    let stored = OrderLineRepository::get_in_tx(&mut tx, op.entity_id).await?.unwrap();
    let sync_id = ChangeLogRepository::append(
        &mut tx,
        EntityType::OrderLine,
        op.entity_id,
        OpType::Update,
        &order_line_to_value(&stored),
        &fields,
        new_version,
    )
    .await?;
    tx.commit().await?;

    Ok(PushOpResult {
        operation_id: op.id,
        status: PushResultStatus::Conflict,
        sync_id: Some(sync_id),
        new_version: Some(new_version),
        message: Some("resolved against concurrent server update".to_string()),
        conflicts: Some(conflicts),
    })
}

async fn resolve_order_line_delete(
    db: &ServerDatabase,
    op: &PushOperation,
) -> ServerResult<PushOpResult> {
    let expected = expected_version(op)?;
    let mut tx = db.pool().begin().await?;
    let current = OrderLineRepository::get_in_tx(&mut tx, op.entity_id)
        .await?
        .ok_or_else(|| ServerError::not_found("order_line", op.entity_id.to_string()))?;

    if expected == current.version {
        let new_version = current.version + 1;
        OrderLineRepository::soft_delete(&mut tx, op.entity_id, new_version).await?;
        let sync_id = ChangeLogRepository::append(
            &mut tx,
            EntityType::OrderLine,
            op.entity_id,
            OpType::Delete,
            &serde_json::json!({ "version": new_version }),
            &[],
            new_version,
        )
        .await?;
        tx.commit().await?;
        return Ok(PushOpResult {
            operation_id: op.id,
            status: PushResultStatus::Success,
            sync_id: Some(sync_id),
            new_version: Some(new_version),
            message: None,
            conflicts: None,
        });
    }

    Ok(PushOpResult {
        operation_id: op.id,
        status: PushResultStatus::Conflict,
        sync_id: None,
        new_version: Some(current.version),
        message: Some("order line was modified concurrently; restore locally".to_string()),
        conflicts: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ServerDbConfig;
    use chrono::Utc;
    use serde_json::json;

    async fn db() -> ServerDatabase {
        ServerDatabase::new(ServerDbConfig::in_memory()).await.unwrap()
    }

    fn create_op(entity_id: Uuid, partner_id: Uuid) -> PushOperation {
        PushOperation {
            id: Uuid::new_v4(),
            entity_type: EntityType::Order,
            entity_id,
            operation_type: OpType::Create,
            data: json!({
                "partner_id": partner_id,
                "delivery_date": Utc::now().to_rfc3339(),
                "status": 0,
            }),
            expected_version: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_assigns_version_one() {
        let db = db().await;
        let entity_id = Uuid::new_v4();
        let result = resolve_operation(&db, create_op(entity_id, Uuid::new_v4())).await.unwrap();
        assert_eq!(result.status, PushResultStatus::Success);
        assert_eq!(result.new_version, Some(1));
    }

    #[tokio::test]
    async fn update_with_matching_version_succeeds() {
        let db = db().await;
        let entity_id = Uuid::new_v4();
        resolve_operation(&db, create_op(entity_id, Uuid::new_v4())).await.unwrap();

        let update = PushOperation {
            id: Uuid::new_v4(),
            entity_type: EntityType::Order,
            entity_id,
            operation_type: OpType::Update,
            data: json!({ "comment": "hello", "version": 1 }),
            expected_version: Some(1),
            timestamp: Utc::now(),
        };
        let result = resolve_operation(&db, update).await.unwrap();
        assert_eq!(result.status, PushResultStatus::Success);
        assert_eq!(result.new_version, Some(2));
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts_and_merges() {
        let db = db().await;
        let entity_id = Uuid::new_v4();
        resolve_operation(&db, create_op(entity_id, Uuid::new_v4())).await.unwrap();

        let first_update = PushOperation {
            id: Uuid::new_v4(),
            entity_type: EntityType::Order,
            entity_id,
            operation_type: OpType::Update,
            data: json!({ "status": 1, "version": 1 }),
            expected_version: Some(1),
            timestamp: Utc::now(),
        };
        resolve_operation(&db, first_update).await.unwrap();

        let stale_update = PushOperation {
            id: Uuid::new_v4(),
            entity_type: EntityType::Order,
            entity_id,
            operation_type: OpType::Update,
            data: json!({ "status": 2, "comment": "late", "version": 1 }),
            expected_version: Some(1),
            timestamp: Utc::now(),
        };
        let result = resolve_operation(&db, stale_update).await.unwrap();
        assert_eq!(result.status, PushResultStatus::Conflict);
        let conflicts = result.conflicts.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "status");

        let stored = db.orders().get(entity_id).await.unwrap().unwrap();
        assert_eq!(stored.comment.as_deref(), Some("late"));
        assert_eq!(stored.status, sync_core::OrderStatus::CONFIRMED);
    }
}
