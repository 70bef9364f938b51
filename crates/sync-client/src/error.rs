//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  ConnectionFail │  │  InvalidMessage         │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  DeserializationFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │      Store      │  │     Business    │                              │
//! │  │                 │  │                 │                              │
//! │  │  DbError wrap   │  │  op rejected by │                              │
//! │  │                 │  │  server         │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Error type covering all possible sync failures (§7: Transport,
/// Business, Store, Protocol — `ConflictResolved` is deliberately not an
/// error variant here, since it's handled inline by the push engine and
/// only ever logged as a warning).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Network failure, 5xx, or timeout. Retryable with backoff.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Malformed server response: missing result for a sent op, unknown
    /// entity_type, body that doesn't parse. Treated as a transport
    /// failure for the batch but logged at a higher severity.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("local store error: {0}")]
    Store(String),

    /// A business rule violation returned by the server for one op
    /// (validation, referential integrity, deleted-parent). Terminal.
    #[error("business error: {0}")]
    Business(String),

    #[error("internal sync error: {0}")]
    Internal(String),

    #[error("sync orchestrator is shutting down")]
    ShuttingDown,
}

impl From<sync_store::DbError> for SyncError {
    fn from(err: sync_store::DbError) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(30)
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl SyncError {
    /// True if this error is retryable with exponential backoff —
    /// transport-layer failures only (§7 TransportError).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Timeout(_) | SyncError::Protocol(_)
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(SyncError::Transport("boom".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(!SyncError::Business("rejected".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }
}
