//! # sync-store: Local Embedded Store
//!
//! SQLite-backed local storage for the offline-first sync core: entity
//! tables (orders, order lines, partners, products, units), the outbox of
//! pending changes, and sync metadata (cursors, timestamps).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      sync-store (THIS CRATE)                    │
//! │                                                                 │
//! │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │
//! │   │   Database    │    │  Repositories │    │  Migrations  │   │
//! │   │   (pool.rs)   │    │ (order.rs,    │    │  (embedded)  │   │
//! │   │               │    │  order_line,  │    │              │   │
//! │   │ SqlitePool    │◄───│  outbox,      │    │ 0001_init.sql│   │
//! │   │ Connection    │    │  reference,   │    │              │   │
//! │   │ Management    │    │  metadata)    │    │              │   │
//! │   └───────────────┘    └───────────────┘    └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (order, order_line, reference, outbox, metadata)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sync_store::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/db.sqlite");
//! let db = Database::new(config).await?;
//!
//! let pending = db.outbox().get_pending_operations().await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::{Database, DbConfig};

pub use repository::metadata::MetadataRepository;
pub use repository::order::{NewOrder, OrderPatch, OrderRepository};
pub use repository::order_line::{NewOrderLine, OrderLinePatch, OrderLineRepository};
pub use repository::outbox::OutboxRepository;
pub use repository::reference::{PartnerRepository, ProductRepository, UnitRepository};
