//! # Error Types
//!
//! Domain-specific error types for sync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  sync-core errors (this file)                                          │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  sync-store errors (separate crate)                                    │
//! │  └── StoreError       - Local database operation failures              │
//! │                                                                         │
//! │  sync-client errors (separate crate)                                   │
//! │  └── SyncError        - Transport/Business/Conflict/Store/Protocol     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StoreError → SyncError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors: business rule violations independent of any
/// storage or transport concern.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An order referenced by id does not exist locally.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// An order line referenced by id does not exist locally.
    #[error("order line not found: {0}")]
    OrderLineNotFound(String),

    /// A repository update/delete targeted an entity that has already
    /// been soft-deleted.
    #[error("{entity} {id} has already been deleted")]
    AlreadyDeleted { entity: String, id: String },

    /// An outbox op carried an entity_type the coalescing/merge logic
    /// does not recognize.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors — raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::OrderNotFound("abc".to_string());
        assert_eq!(err.to_string(), "order not found: abc");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "partner_id".to_string(),
        };
        assert_eq!(err.to_string(), "partner_id is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "partner_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
