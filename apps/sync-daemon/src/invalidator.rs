//! Cache invalidation sink for the daemon.
//!
//! There is no rendering layer in this core (spec §1 Non-goals), so the
//! write-only sink the orchestrator calls into (§5 "the Orchestrator MUST
//! NOT read cache state during sync") is realized as a structured log
//! line rather than a UI re-render. A desktop or web shell embedding
//! `sync-client` directly would swap this for one that notifies its own
//! query cache, the way the teacher's `SyncAgent` emits `sync://progress`
//! events to its Tauri frontend instead.

use tracing::info;
use uuid::Uuid;

use sync_client::CacheInvalidator;

#[derive(Debug, Default)]
pub struct LoggingInvalidator;

impl CacheInvalidator for LoggingInvalidator {
    fn invalidate_orders(&self, order_ids: &[Uuid]) {
        info!(count = order_ids.len(), order_ids = ?order_ids, "invalidating order queries");
    }

    fn invalidate_reference_data(&self) {
        info!("invalidating reference data queries (partners/products/units)");
    }
}
