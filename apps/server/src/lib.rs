//! # order-sync-server
//!
//! Axum REST+SSE binary exposing the server half of the offline-first
//! sync contract (spec §6): push/pull/snapshot/events plus read-only
//! reference listings, backed by `sync-server`'s change log, conflict
//! resolver and SSE broadcaster.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       order-sync-server                             │
//! │                                                                     │
//! │  ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐ │
//! │  │  axum router    │    │  sync-server    │    │  SQLite (WAL)   │ │
//! │  │  (REST + SSE)   │───►│  resolver,      │───►│  entities +     │ │
//! │  │  bearer gate    │    │  change log,    │    │  change log     │ │
//! │  │                 │    │  broadcaster    │    │                 │ │
//! │  └─────────────────┘    └─────────────────┘    └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `BIND_ADDR` - listen address (default: `0.0.0.0:8080`)
//! - `DATABASE_PATH` - SQLite file path (default: `order-sync-server.sqlite`)
//! - `SYNC_AUTH_TOKEN` - bearer token gating `/sync/*` and reference routes
//! - `DEFAULT_PULL_LIMIT` - page size when a pull omits `limit` (default: 100)
//! - `SSE_PING_INTERVAL_SECS` - SSE keepalive interval (default: 30)

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

pub use config::ServerConfig;
pub use error::ApiError;
use sync_server::{ServerDatabase, SyncBroadcaster};

/// Shared application state, cloned cheaply into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: ServerDatabase,
    pub broadcaster: Arc<SyncBroadcaster>,
    pub config: Arc<ServerConfig>,
}
