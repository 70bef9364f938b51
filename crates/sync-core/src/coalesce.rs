//! # Coalescing
//!
//! Folds a batch of pending outbox ops, grouped by `(entity_type,
//! entity_id)`, into at most one network operation per entity — per the
//! rules of the push engine's coalescing step. Coalescing never reorders
//! ops across different entities; within one entity the coalesced result
//! is defined to be equivalent to applying the whole original sequence to
//! fresh state.
//!
//! Rules, in order of applicability:
//! - a lone op passes through unchanged
//! - `CREATE` followed only by `UPDATE`s folds into one `CREATE`: data
//!   merged last-writer-wins per field (skipping each UPDATE's injected
//!   `version` field), timestamp of the last op, id/sequence of the CREATE
//! - `CREATE` ... `DELETE` anywhere after it cancels the whole group: it
//!   never reaches the network, and every member is marked synced locally
//! - `UPDATE`s with no `DELETE` fold into one `UPDATE`: data merged in
//!   order but the **first** UPDATE's `version` field is kept (that is the
//!   expected_version the server still needs to see)
//! - `UPDATE`s followed by a `DELETE` discard the UPDATEs (marked synced
//!   locally) and send only the DELETE, with the DELETE's own `version`
//!   field untouched

use crate::merge::merge_fields;
use crate::outbox::{EntityType, OpType, OutboxRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One coalesced network operation, ready for wire serialization. The
/// `data` map still carries an internal `version` key for UPDATE/DELETE
/// (the caller extracts it as `expected_version`); CREATE never carries one.
#[derive(Debug, Clone)]
pub struct SendOp {
    pub id: Uuid,
    pub sequence_number: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub op_type: OpType,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// What coalescing decided for one `(entity_type, entity_id)` group.
#[derive(Debug, Clone)]
pub enum GroupOutcome {
    /// Exactly one operation should be sent over the wire.
    Send(SendOp),
    /// The group cancels out entirely (e.g. CREATE immediately undone by
    /// a DELETE); nothing is sent, every member is synced locally.
    Cancel,
}

/// A coalesced group: all outbox record ids that were folded together,
/// plus the single outcome for all of them. When the network call (if
/// any) resolves, its result is applied uniformly to every `member_ids`
/// entry.
#[derive(Debug, Clone)]
pub struct CoalesceGroup {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub member_ids: Vec<Uuid>,
    pub outcome: GroupOutcome,
}

fn as_map(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn resolve_group(ops: &[OutboxRecord]) -> GroupOutcome {
    if ops.len() == 1 {
        let op = &ops[0];
        return GroupOutcome::Send(SendOp {
            id: op.id,
            sequence_number: op.sequence_number,
            entity_type: op.entity_type,
            entity_id: op.entity_id,
            op_type: op.op_type,
            data: as_map(&op.data),
            timestamp: op.timestamp,
        });
    }

    let has_delete = ops.iter().any(|o| o.op_type == OpType::Delete);
    let first = &ops[0];

    if first.op_type == OpType::Create {
        if has_delete {
            return GroupOutcome::Cancel;
        }
        let mut data = as_map(&first.data);
        for op in &ops[1..] {
            let mut patch = as_map(&op.data);
            patch.remove("version");
            merge_fields(&mut data, &patch);
        }
        let last = ops.last().unwrap();
        return GroupOutcome::Send(SendOp {
            id: first.id,
            sequence_number: first.sequence_number,
            entity_type: first.entity_type,
            entity_id: first.entity_id,
            op_type: OpType::Create,
            data,
            timestamp: last.timestamp,
        });
    }

    if has_delete {
        let delete_op = ops.iter().find(|o| o.op_type == OpType::Delete).unwrap();
        return GroupOutcome::Send(SendOp {
            id: delete_op.id,
            sequence_number: delete_op.sequence_number,
            entity_type: delete_op.entity_type,
            entity_id: delete_op.entity_id,
            op_type: OpType::Delete,
            data: as_map(&delete_op.data),
            timestamp: delete_op.timestamp,
        });
    }

    // All UPDATEs: merge in order, keep the first UPDATE's version field.
    let first_version = as_map(&first.data).get("version").cloned();
    let mut data = as_map(&first.data);
    for op in &ops[1..] {
        let mut patch = as_map(&op.data);
        patch.remove("version");
        merge_fields(&mut data, &patch);
    }
    match first_version {
        Some(v) => {
            data.insert("version".to_string(), v);
        }
        None => {
            data.remove("version");
        }
    }
    let last = ops.last().unwrap();
    GroupOutcome::Send(SendOp {
        id: first.id,
        sequence_number: first.sequence_number,
        entity_type: first.entity_type,
        entity_id: first.entity_id,
        op_type: OpType::Update,
        data,
        timestamp: last.timestamp,
    })
}

/// Coalesces a flat, sequence-ordered batch of pending outbox records into
/// per-entity groups. Input order is assumed to already be sorted by
/// `sequence_number` (as `getPendingOperations` guarantees); groups appear
/// in the order their first member was first seen.
pub fn coalesce(ops: &[OutboxRecord]) -> Vec<CoalesceGroup> {
    let mut order: Vec<(EntityType, Uuid)> = Vec::new();
    let mut buckets: std::collections::HashMap<(EntityType, Uuid), Vec<OutboxRecord>> =
        std::collections::HashMap::new();

    for op in ops {
        let key = op.group_key();
        buckets.entry(key).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        buckets.get_mut(&key).unwrap().push(op.clone());
    }

    order
        .into_iter()
        .map(|key| {
            let members = buckets.remove(&key).unwrap();
            let member_ids = members.iter().map(|o| o.id).collect();
            let outcome = resolve_group(&members);
            CoalesceGroup {
                entity_type: key.0,
                entity_id: key.1,
                member_ids,
                outcome,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::OutboxStatus;
    use serde_json::json;

    fn op(
        seq: i64,
        entity_id: Uuid,
        op_type: OpType,
        data: Value,
        ts_secs: i64,
    ) -> OutboxRecord {
        OutboxRecord {
            id: Uuid::new_v4(),
            sequence_number: seq,
            entity_type: EntityType::Order,
            entity_id,
            op_type,
            data,
            timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        }
    }

    #[test]
    fn lone_op_passes_through() {
        let id = Uuid::new_v4();
        let ops = vec![op(1, id, OpType::Update, json!({"comment": "x", "version": 1}), 1)];
        let groups = coalesce(&ops);
        assert_eq!(groups.len(), 1);
        match &groups[0].outcome {
            GroupOutcome::Send(send) => assert_eq!(send.op_type, OpType::Update),
            GroupOutcome::Cancel => panic!("expected Send"),
        }
    }

    #[test]
    fn create_then_updates_folds_into_one_create() {
        let id = Uuid::new_v4();
        let ops = vec![
            op(1, id, OpType::Create, json!({"status": 0, "comment": "a"}), 1),
            op(2, id, OpType::Update, json!({"status": 1, "version": 1}), 2),
            op(3, id, OpType::Update, json!({"comment": "b", "version": 2}), 3),
        ];
        let groups = coalesce(&ops);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_ids.len(), 3);
        match &groups[0].outcome {
            GroupOutcome::Send(send) => {
                assert_eq!(send.op_type, OpType::Create);
                assert_eq!(send.data["status"], json!(1));
                assert_eq!(send.data["comment"], json!("b"));
                assert!(!send.data.contains_key("version"));
                assert_eq!(send.timestamp.timestamp(), 3);
            }
            GroupOutcome::Cancel => panic!("expected Send"),
        }
    }

    #[test]
    fn create_then_delete_cancels_whole_group() {
        let id = Uuid::new_v4();
        let ops = vec![
            op(1, id, OpType::Create, json!({"status": 0}), 1),
            op(2, id, OpType::Delete, json!({"version": 1}), 2),
        ];
        let groups = coalesce(&ops);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_ids.len(), 2);
        assert!(matches!(groups[0].outcome, GroupOutcome::Cancel));
    }

    #[test]
    fn updates_fold_keeping_first_version() {
        let id = Uuid::new_v4();
        let ops = vec![
            op(1, id, OpType::Update, json!({"status": 1, "version": 5}), 1),
            op(2, id, OpType::Update, json!({"comment": "z", "version": 6}), 2),
        ];
        let groups = coalesce(&ops);
        match &groups[0].outcome {
            GroupOutcome::Send(send) => {
                assert_eq!(send.op_type, OpType::Update);
                assert_eq!(send.data["version"], json!(5));
                assert_eq!(send.data["status"], json!(1));
                assert_eq!(send.data["comment"], json!("z"));
            }
            GroupOutcome::Cancel => panic!("expected Send"),
        }
    }

    #[test]
    fn updates_then_delete_discards_updates_keeps_deletes_own_version() {
        let id = Uuid::new_v4();
        let ops = vec![
            op(1, id, OpType::Update, json!({"status": 1, "version": 5}), 1),
            op(2, id, OpType::Delete, json!({"version": 6}), 2),
        ];
        let groups = coalesce(&ops);
        match &groups[0].outcome {
            GroupOutcome::Send(send) => {
                assert_eq!(send.op_type, OpType::Delete);
                assert_eq!(send.data["version"], json!(6));
            }
            GroupOutcome::Cancel => panic!("expected Send"),
        }
    }

    #[test]
    fn different_entities_never_share_a_group() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ops = vec![
            op(1, a, OpType::Update, json!({"version": 1}), 1),
            op(2, b, OpType::Update, json!({"version": 1}), 2),
        ];
        let groups = coalesce(&ops);
        assert_eq!(groups.len(), 2);
    }
}
