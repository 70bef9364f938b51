//! # sync-server
//!
//! The authoritative side of the sync contract: append-only change log,
//! per-field conflict resolution, and SSE fan-out. `apps/server` mounts
//! an axum binary on top of this crate; it owns no HTTP concerns itself.

pub mod broadcast;
pub mod changelog;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod protocol;
pub mod repository;
pub mod resolver;

pub use broadcast::SyncBroadcaster;
pub use changelog::{ChangeLogEntry, ChangeLogRepository};
pub use error::{ServerError, ServerResult};
pub use pool::{ServerDatabase, ServerDbConfig};
pub use resolver::resolve_operation;
