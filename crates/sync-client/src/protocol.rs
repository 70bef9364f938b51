//! # Wire Protocol
//!
//! Request/response shapes for the HTTP surface described in spec §6.
//! These mirror the server's wire contract exactly; `sync_core`'s
//! `EntityType`/`OpType` already serialize to the right strings
//! (`"order"`/`"order_line"`, `"CREATE"`/`"UPDATE"`/`"DELETE"`), so they're
//! reused directly rather than re-declared here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sync_core::{EntityType, OpType, Order, OrderLine, OrderStatus, Partner, Product, Unit};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct PushOperation {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation_type: OpType,
    pub data: Value,
    pub expected_version: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushRequest {
    pub operations: Vec<PushOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushResultStatus {
    Success,
    Conflict,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictWinner {
    Client,
    Server,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub client_value: Value,
    pub server_value: Value,
    pub winner: ConflictWinner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushOpResult {
    pub operation_id: Uuid,
    pub status: PushResultStatus,
    pub sync_id: Option<i64>,
    pub new_version: Option<i64>,
    pub message: Option<String>,
    pub conflicts: Option<Vec<FieldConflict>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushResponse {
    pub results: Vec<PushOpResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullLogEntry {
    pub sync_id: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation_type: OpType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullResponse {
    pub operations: Vec<PullLogEntry>,
    pub has_more: bool,
}

/// `Order` as carried by `GET /sync/snapshot`: the server omits `version`
/// (§6, "without version") since every row in a fresh snapshot starts at
/// version 1 by definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotOrder {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub status: OrderStatus,
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_date: DateTime<Utc>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SnapshotOrder> for Order {
    fn from(s: SnapshotOrder) -> Order {
        Order {
            id: s.id,
            partner_id: s.partner_id,
            status: s.status,
            order_date: s.order_date,
            delivery_date: s.delivery_date,
            comment: s.comment,
            created_at: s.created_at,
            updated_at: s.updated_at,
            version: 1,
            deleted_at: None,
        }
    }
}

/// `OrderLine` as carried by the snapshot; see [`SnapshotOrder`].
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotOrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: i64,
    pub price_cents: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SnapshotOrderLine> for OrderLine {
    fn from(s: SnapshotOrderLine) -> OrderLine {
        OrderLine {
            id: s.id,
            order_id: s.order_id,
            product_id: s.product_id,
            unit_id: s.unit_id,
            quantity: s.quantity,
            price_cents: s.price_cents,
            comment: s.comment,
            created_at: s.created_at,
            updated_at: s.updated_at,
            version: 1,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    pub partners: Vec<Partner>,
    pub products: Vec<Product>,
    pub units: Vec<Unit>,
    pub orders: Vec<SnapshotOrder>,
    pub order_lines: Vec<SnapshotOrderLine>,
}

/// An SSE payload. `event == "ping"` is a keepalive and carries no
/// entity fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SseSyncEvent {
    pub event: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub entity_id: Option<Uuid>,
    #[serde(default)]
    pub sync_id: Option<i64>,
}
