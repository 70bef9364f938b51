//! # Local Store Error Types

use thiserror::Error;

/// Local store (SQLite) operation errors. The store never retries on its
/// own — retry policy belongs to the push engine.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("malformed stored value for {field}: {reason}")]
    Malformed { field: String, reason: String },

    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::Malformed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => DbError::Internal("connection pool exhausted".to_string()),
            sqlx::Error::PoolClosed => DbError::Internal("connection pool closed".to_string()),
            other => DbError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Malformed {
            field: "data".to_string(),
            reason: err.to_string(),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
