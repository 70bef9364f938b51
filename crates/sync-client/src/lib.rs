//! # sync-client
//!
//! Drives the offline-first sync protocol against a remote server: the
//! push engine drains and coalesces the local outbox, the pull engine
//! ingests the server's change log and rebases pending work on top of
//! it, and the orchestrator serializes the two behind one FIFO queue
//! while reacting to connectivity transitions and SSE notifications.
//!
//! ## Module Organization
//!
//! - [`orchestrator`] - `SyncOrchestrator`, the FIFO queue owner
//! - [`push`] - `PushEngine`, drains and coalesces the outbox
//! - [`pull`] - `PullEngine`, applies and rebases incoming server ops
//! - [`transport`] - HTTP/SSE client
//! - [`protocol`] - wire request/response shapes
//! - [`config`] - sync configuration (server URL, timing knobs)
//! - [`error`] - error types
//! - [`invalidation`] - cache invalidation hook for the host app
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SyncOrchestrator                          │
//! │                                                                 │
//! │  push timer ──┐                                                 │
//! │  connectivity ├─► FIFO queue ─► PushEngine ─► SyncTransport      │
//! │  SSE (debounced)┘              ─► PullEngine ─┘                  │
//! │                                                                 │
//! │  status: tokio::sync::watch::Receiver<SyncStatus>                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod invalidation;
pub mod orchestrator;
pub mod protocol;
pub mod pull;
pub mod push;
pub mod transport;

pub use config::{ServerConfig, SyncConfig, SyncTimingConfig};
pub use error::{SyncError, SyncResult};
pub use invalidation::{CacheInvalidator, NoOpInvalidator};
pub use orchestrator::{
    ConnectivityMonitor, ConnectivityState, ReqwestConnectivityMonitor, SyncOrchestrator,
    SyncOrchestratorHandle, SyncStatus,
};
pub use pull::{PullEngine, PullSummary};
pub use push::{PushEngine, PushSummary};
pub use transport::SyncTransport;
