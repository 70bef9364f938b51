//! # Push Engine
//!
//! Drains the outbox into at most one server request per invocation
//! (§4.3). `run_once` is the single entry point the orchestrator's queue
//! invokes; everything else here is a private step of that pipeline,
//! mirroring the shape of a single `process_batch` call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use sync_core::coalesce::{coalesce, CoalesceGroup, GroupOutcome};
use sync_core::{EntityType, OpType};
use sync_store::Database;

use crate::error::SyncResult;
use crate::invalidation::CacheInvalidator;
use crate::protocol::{ConflictWinner, PushOperation, PushRequest, PushResultStatus};
use crate::transport::SyncTransport;

/// Outcome of one push cycle, reported to the orchestrator for status
/// bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushSummary {
    /// Outbox ops examined this round (after coalescing, before send).
    pub processed: usize,
    /// Network operations actually posted.
    pub sent: usize,
}

pub struct PushEngine {
    db: Database,
    transport: SyncTransport,
    invalidator: Arc<dyn CacheInvalidator>,
}

fn group_op_type(group: &CoalesceGroup) -> OpType {
    match &group.outcome {
        GroupOutcome::Send(send) => send.op_type,
        GroupOutcome::Cancel => unreachable!("group_op_type called on a cancelled group"),
    }
}

impl PushEngine {
    pub fn new(db: Database, transport: SyncTransport, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        PushEngine {
            db,
            transport,
            invalidator,
        }
    }

    pub async fn run_once(&self) -> SyncResult<PushSummary> {
        // 1. Snapshot pending operations.
        let pending = self.db.outbox().get_pending_operations().await?;
        let processed = pending.len();
        if pending.is_empty() {
            return Ok(PushSummary::default());
        }

        // 2. Coalesce per entity.
        let groups = coalesce(&pending);

        let mut to_send = Vec::with_capacity(groups.len());
        let mut cancelled_ids = Vec::new();
        let mut members_by_send_id: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut group_by_send_id: HashMap<Uuid, &CoalesceGroup> = HashMap::new();

        for group in &groups {
            match &group.outcome {
                GroupOutcome::Cancel => {
                    cancelled_ids.extend(group.member_ids.iter().copied());
                }
                GroupOutcome::Send(send) => {
                    let mut data = send.data.clone();
                    // `version` is client-local bookkeeping (the coalesced
                    // CREATE's implicit version 1, or the UPDATE/DELETE's
                    // expected pre-version); the wire `data` MUST NOT carry
                    // it (§6) — CREATE drops it outright, others promote it
                    // to `expected_version`.
                    let expected_version = match send.op_type {
                        OpType::Create => {
                            data.remove("version");
                            None
                        }
                        _ => data.remove("version").and_then(|v| v.as_i64()),
                    };
                    to_send.push(PushOperation {
                        id: send.id,
                        entity_type: send.entity_type,
                        entity_id: send.entity_id,
                        operation_type: send.op_type,
                        data: Value::Object(data),
                        expected_version,
                        timestamp: send.timestamp,
                    });
                    members_by_send_id.insert(send.id, group.member_ids.clone());
                    group_by_send_id.insert(send.id, group);
                }
            }
        }

        // 3. Cancelled groups are vacuously satisfied.
        if !cancelled_ids.is_empty() {
            self.db.outbox().mark_synced_bulk(&cancelled_ids).await?;
        }

        // 4. Nothing left to send.
        if to_send.is_empty() {
            return Ok(PushSummary {
                processed,
                sent: 0,
            });
        }

        // 5. Mark surviving ops syncing.
        let syncing_ids: Vec<Uuid> = members_by_send_id.values().flatten().copied().collect();
        self.db.outbox().mark_syncing(&syncing_ids).await?;

        let sent = to_send.len();
        let request = PushRequest {
            operations: to_send,
        };

        // 6. POST the batch.
        let response = match self.transport.push(&request).await {
            Ok(response) => response,
            Err(err) => {
                // 8. Transport failure: every sent op goes back to failed
                // with backoff scheduling handled by the repository.
                warn!(error = %err, "push transport failure");
                for id in &syncing_ids {
                    self.db.outbox().mark_failed(*id, &err.to_string()).await?;
                }
                return Ok(PushSummary { processed, sent: 0 });
            }
        };

        // 7. Reconcile results.
        let mut touched_orders: HashSet<Uuid> = HashSet::new();
        let mut success_count = 0usize;

        for result in &response.results {
            let Some(members) = members_by_send_id.get(&result.operation_id) else {
                warn!(operation_id = %result.operation_id, "push response referenced unknown operation id");
                continue;
            };
            let Some(group) = group_by_send_id.get(&result.operation_id).copied() else {
                continue;
            };

            match result.status {
                PushResultStatus::Success => {
                    self.db.outbox().mark_synced_bulk(members).await?;
                    if let Some(new_version) = result.new_version {
                        self.apply_new_version(group.entity_type, group.entity_id, new_version)
                            .await?;
                    }
                    self.collect_order_id(group.entity_type, group.entity_id, &mut touched_orders)
                        .await?;
                    success_count += 1;
                }
                PushResultStatus::Conflict => {
                    if group_op_type(group) == OpType::Delete {
                        if let Some(new_version) = result.new_version {
                            self.restore_deleted(group.entity_type, group.entity_id, new_version)
                                .await?;
                        }
                        self.db
                            .outbox()
                            .mark_rejected(
                                result.operation_id,
                                result.message.as_deref().unwrap_or("entity modified concurrently"),
                            )
                            .await?;
                    } else {
                        if let Some(new_version) = result.new_version {
                            self.apply_new_version(group.entity_type, group.entity_id, new_version)
                                .await?;
                        }
                        if let Some(conflicts) = &result.conflicts {
                            for conflict in conflicts {
                                if conflict.winner == ConflictWinner::Server {
                                    self.set_field(
                                        group.entity_type,
                                        group.entity_id,
                                        &conflict.field,
                                        &conflict.server_value,
                                    )
                                    .await?;
                                }
                            }
                        }
                        warn!(
                            entity_type = %group.entity_type,
                            entity_id = %group.entity_id,
                            "server resolved a field conflict on push"
                        );
                        self.db.outbox().mark_synced_bulk(members).await?;
                        success_count += 1;
                    }
                    self.collect_order_id(group.entity_type, group.entity_id, &mut touched_orders)
                        .await?;
                }
                PushResultStatus::Error => {
                    let message = result
                        .message
                        .clone()
                        .unwrap_or_else(|| "rejected by server".to_string());
                    self.db.outbox().mark_rejected(result.operation_id, &message).await?;
                }
            }
        }

        // 10. Invalidate the cache for every touched order in one call.
        if !touched_orders.is_empty() {
            let ids: Vec<Uuid> = touched_orders.into_iter().collect();
            self.invalidator.invalidate_orders(&ids);
        }

        // 9. Record the push timestamp iff something actually succeeded.
        if success_count > 0 {
            self.db
                .metadata()
                .set_last_push_timestamp(Utc::now().timestamp_millis())
                .await?;
        }

        Ok(PushSummary { processed, sent })
    }

    async fn apply_new_version(&self, entity_type: EntityType, entity_id: Uuid, new_version: i64) -> SyncResult<()> {
        match entity_type {
            EntityType::Order => self.db.orders().update_version(entity_id, new_version).await?,
            EntityType::OrderLine => {
                self.db.order_lines().update_version(entity_id, new_version).await?
            }
        }
        Ok(())
    }

    async fn set_field(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        field: &str,
        value: &Value,
    ) -> SyncResult<()> {
        match entity_type {
            EntityType::Order => self.db.orders().set_field(entity_id, field, value).await?,
            EntityType::OrderLine => {
                self.db.order_lines().set_field(entity_id, field, value).await?
            }
        }
        Ok(())
    }

    async fn restore_deleted(&self, entity_type: EntityType, entity_id: Uuid, new_version: i64) -> SyncResult<()> {
        match entity_type {
            EntityType::Order => self.db.orders().restore(entity_id, new_version).await?,
            EntityType::OrderLine => self.db.order_lines().restore(entity_id, new_version).await?,
        }
        Ok(())
    }

    /// Resolves the order id a cache invalidation should target: the
    /// entity itself for `Order`, or its parent for `OrderLine`.
    async fn collect_order_id(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        touched: &mut HashSet<Uuid>,
    ) -> SyncResult<()> {
        match entity_type {
            EntityType::Order => {
                touched.insert(entity_id);
            }
            EntityType::OrderLine => {
                if let Some(line) = self.db.order_lines().get_including_deleted(entity_id).await? {
                    touched.insert(line.order_id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_store::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn empty_outbox_sends_nothing() {
        let db = test_db().await;
        let transport = SyncTransport::new(&crate::config::SyncConfig::new("http://127.0.0.1:1")).unwrap();
        let engine = PushEngine::new(db, transport, Arc::new(crate::invalidation::NoOpInvalidator));
        let summary = engine.run_once().await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.sent, 0);
    }
}
