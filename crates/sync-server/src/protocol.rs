//! # Server-Side Wire Protocol
//!
//! Mirrors `sync_client::protocol` field-for-field; the server needs the
//! opposite `Serialize`/`Deserialize` halves (it receives what the client
//! sends and sends what the client receives), so the shapes are declared
//! again here rather than shared, to keep each crate's derives minimal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sync_core::{EntityType, OpType, Order, OrderLine, OrderStatus, Partner, Product, Unit};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct PushOperation {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation_type: OpType,
    pub data: Value,
    pub expected_version: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
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

#[derive(Debug, Clone, Serialize)]
pub struct FieldConflict {
    pub field: String,
    pub client_value: Value,
    pub server_value: Value,
    pub winner: ConflictWinner,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOpResult {
    pub operation_id: Uuid,
    pub status: PushResultStatus,
    pub sync_id: Option<i64>,
    pub new_version: Option<i64>,
    pub message: Option<String>,
    pub conflicts: Option<Vec<FieldConflict>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushResponse {
    pub results: Vec<PushOpResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullLogEntry {
    pub sync_id: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation_type: OpType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullResponse {
    pub operations: Vec<PullLogEntry>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullQuery {
    pub since: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
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

impl From<Order> for SnapshotOrder {
    fn from(o: Order) -> SnapshotOrder {
        SnapshotOrder {
            id: o.id,
            partner_id: o.partner_id,
            status: o.status,
            order_date: o.order_date,
            delivery_date: o.delivery_date,
            comment: o.comment,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
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

impl From<OrderLine> for SnapshotOrderLine {
    fn from(l: OrderLine) -> SnapshotOrderLine {
        SnapshotOrderLine {
            id: l.id,
            order_id: l.order_id,
            product_id: l.product_id,
            unit_id: l.unit_id,
            quantity: l.quantity,
            price_cents: l.price_cents,
            comment: l.comment,
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub partners: Vec<Partner>,
    pub products: Vec<Product>,
    pub units: Vec<Unit>,
    pub orders: Vec<SnapshotOrder>,
    pub order_lines: Vec<SnapshotOrderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SseSyncEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<i64>,
}

impl SseSyncEvent {
    pub fn ping() -> Self {
        SseSyncEvent {
            event: "ping".to_string(),
            entity_type: None,
            entity_id: None,
            sync_id: None,
        }
    }

    pub fn changed(entity_type: EntityType, entity_id: Uuid, sync_id: i64) -> Self {
        SseSyncEvent {
            event: "sync".to_string(),
            entity_type: Some(entity_type),
            entity_id: Some(entity_id),
            sync_id: Some(sync_id),
        }
    }
}
