//! # Domain Types
//!
//! Entities and reference data exchanged between the local store, the push/
//! pull engines and the server. These are plain data types; the rules that
//! govern how they change live in [`crate::coalesce`], [`crate::merge`] and
//! in `sync-store`'s repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a pre-order, stored and transmitted as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct OrderStatus(i32);

impl OrderStatus {
    pub const DRAFT: OrderStatus = OrderStatus(0);
    pub const CONFIRMED: OrderStatus = OrderStatus(1);
    pub const FULFILLED: OrderStatus = OrderStatus(2);
    pub const CANCELLED: OrderStatus = OrderStatus(3);

    pub const fn code(self) -> i32 {
        self.0
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::DRAFT
    }
}

impl From<OrderStatus> for i32 {
    fn from(s: OrderStatus) -> i32 {
        s.0
    }
}

impl TryFrom<i32> for OrderStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0..=3 => Ok(OrderStatus(code)),
            other => Err(format!("unknown order status code: {other}")),
        }
    }
}

/// A pre-order placed for a partner, to be fulfilled on a delivery date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub status: OrderStatus,
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_date: DateTime<Utc>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A single line item within an [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: i64,
    /// Unit price in integer cents — avoids float drift in derived totals.
    pub price_cents: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Reference entity: the customer/business an order is placed for. Only
/// ever created or updated via snapshot or server-originated log entries —
/// never mutated directly by the local client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub contact_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reference entity: a sellable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub default_unit_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reference entity: a unit of measure (box, kg, each, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips_through_json_as_integer() {
        let status = OrderStatus::CONFIRMED;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "1");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn order_status_rejects_unknown_code() {
        let err = serde_json::from_str::<OrderStatus>("99");
        assert!(err.is_err());
    }
}
