//! # Outbox Record Shape
//!
//! The outbox is the client's record of intent: every local mutation of a
//! syncable entity appends one row here before (or atomically with) the
//! entity write itself. `sync-store` persists these; this module only
//! defines the shape and the small bits of pure logic around it (status
//! transitions, backoff scheduling).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of retry attempts before an outbox op is abandoned
/// (excluded from `getPendingOperations`, `next_retry_at` cleared).
pub const MAX_RETRY_ATTEMPTS: i64 = 5;

/// Base backoff delay, doubled per attempt.
pub const BASE_BACKOFF_MS: i64 = 1_000;

/// Backoff delay ceiling.
pub const MAX_BACKOFF_MS: i64 = 5 * 60 * 1_000;

/// The two syncable entity kinds. Deliberately a closed sum type — the
/// push/pull engines dispatch on it directly rather than through any
/// runtime registry, since the set of syncable entities is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum EntityType {
    Order,
    OrderLine,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Order => "order",
            EntityType::OrderLine => "order_line",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The mutation an outbox entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Create => "CREATE",
            OpType::Update => "UPDATE",
            OpType::Delete => "DELETE",
        }
    }
}

/// Lifecycle status of an outbox entry. Forms a DAG:
/// `pending -> syncing -> {synced, failed, rejected}`, `failed -> pending`
/// (on retry). `synced` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum OutboxStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
    Rejected,
}

/// A single outbox record as persisted by the local store.
///
/// `data` is an opaque field bag: for CREATE it's the full entity row,
/// for UPDATE it's the patch plus an injected `version` field holding the
/// expected pre-increment version, for DELETE it's just `{"version": N}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub sequence_number: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub op_type: OpType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub status: OutboxStatus,
    pub retry_count: i64,
    /// Epoch milliseconds; `None` once retries are exhausted or the op is
    /// not currently in backoff.
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// The `(entity_type, entity_id)` grouping key used by coalescing and
    /// by the pull engine's pending-by-entity lookup.
    pub fn group_key(&self) -> (EntityType, Uuid) {
        (self.entity_type, self.entity_id)
    }

    /// True if this op is eligible to be picked up by `getPendingOperations`
    /// at `now_ms`: either plainly pending, or failed with a backoff that
    /// has elapsed.
    pub fn is_due(&self, now_ms: i64) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => self.next_retry_at.map(|t| t <= now_ms).unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: OutboxStatus, next_retry_at: Option<i64>) -> OutboxRecord {
        OutboxRecord {
            id: Uuid::nil(),
            sequence_number: 1,
            entity_type: EntityType::Order,
            entity_id: Uuid::nil(),
            op_type: OpType::Update,
            data: serde_json::json!({}),
            timestamp: Utc::now(),
            status,
            retry_count: 0,
            next_retry_at,
            last_error: None,
        }
    }

    #[test]
    fn pending_is_always_due() {
        assert!(sample(OutboxStatus::Pending, None).is_due(0));
    }

    #[test]
    fn failed_is_due_only_after_next_retry_at() {
        let rec = sample(OutboxStatus::Failed, Some(1_000));
        assert!(!rec.is_due(500));
        assert!(rec.is_due(1_000));
        assert!(rec.is_due(1_500));
    }

    #[test]
    fn failed_without_next_retry_at_is_never_due() {
        assert!(!sample(OutboxStatus::Failed, None).is_due(i64::MAX));
    }

    #[test]
    fn synced_and_syncing_are_never_due() {
        assert!(!sample(OutboxStatus::Synced, None).is_due(0));
        assert!(!sample(OutboxStatus::Syncing, None).is_due(0));
        assert!(!sample(OutboxStatus::Rejected, None).is_due(0));
    }

    #[test]
    fn entity_type_display_matches_wire_format() {
        assert_eq!(EntityType::Order.to_string(), "order");
        assert_eq!(EntityType::OrderLine.to_string(), "order_line");
    }
}
