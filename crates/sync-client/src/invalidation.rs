//! # Query Cache Invalidation
//!
//! The UI's query cache is a write-only sink from the sync core's point
//! of view (§5 Shared-resource policy: "the Orchestrator MUST NOT read
//! cache state during sync"). This trait is that sink; push/pull engines
//! call it with the set of affected order ids once a sync round settles.

use std::fmt;
use uuid::Uuid;

pub trait CacheInvalidator: Send + Sync + fmt::Debug {
    /// Invalidates any cached query results touching the given orders
    /// (e.g. `["recap", date]` queries that include one of these orders).
    fn invalidate_orders(&self, order_ids: &[Uuid]);

    /// Invalidates reference-collection queries (`["partners"]`,
    /// `["products"]`, `["units"]`), called once after an initial
    /// snapshot.
    fn invalidate_reference_data(&self);
}

/// Used in tests and anywhere no UI is attached.
#[derive(Debug, Default, Clone)]
pub struct NoOpInvalidator;

impl CacheInvalidator for NoOpInvalidator {
    fn invalidate_orders(&self, _order_ids: &[Uuid]) {}
    fn invalidate_reference_data(&self) {}
}
