//! # sync-core: Pure Domain Logic for the Order Sync Engine
//!
//! The heart of the sync system's business rules, kept free of I/O so it
//! can be unit tested exhaustively and reused from both the client
//! (`sync-client`) and the server (`sync-server`).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    sync-client / sync-server                    │
//! └─────────────────────────────┬─────────────────────────────────┬─┘
//!                                │                                 │
//!                   ┌────────────▼────────────┐       ┌────────────▼──┐
//!                   │     ★ sync-core ★        │       │  sync-store   │
//!                   │                          │       │   (SQLite)    │
//!                   │  types · outbox · merge  │       │               │
//!                   │  coalesce · backoff      │       │               │
//!                   │  validation · errors     │       │               │
//!                   │                          │       │               │
//!                   │  NO I/O • PURE FUNCTIONS │       │               │
//!                   └──────────────────────────┘       └───────────────┘
//! ```
//!
//! ## Modules
//! - [`types`] — entities and reference collections (Order, OrderLine, ...)
//! - [`outbox`] — the outbox record shape and its status DAG
//! - [`coalesce`] — the push engine's coalescing algorithm
//! - [`merge`] — field-level last-writer-wins merge helpers
//! - [`backoff`] — retry delay computation
//! - [`validation`] — business rule validation
//! - [`error`] — domain error types

pub mod backoff;
pub mod coalesce;
pub mod error;
pub mod merge;
pub mod outbox;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use outbox::{EntityType, OpType, OutboxRecord, OutboxStatus};
pub use types::{Order, OrderLine, OrderStatus, Partner, Product, Unit};
