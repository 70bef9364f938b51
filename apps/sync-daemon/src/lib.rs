//! # order-sync-daemon
//!
//! Thin host process: wires `sync-store`'s local database to
//! `sync-client`'s push/pull engines and orchestrator, and keeps the
//! process alive reacting to connectivity and SSE events. This is the
//! core's replacement for the out-of-scope rendering layer (spec §1) —
//! a desktop or web shell would embed `sync-client` directly the same
//! way and swap [`invalidator::LoggingInvalidator`] for one that touches
//! its own query cache.

pub mod config;
pub mod error;
pub mod invalidator;

pub use config::DaemonConfig;
pub use error::DaemonError;
