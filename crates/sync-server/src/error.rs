//! # Server-Side Error Types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("malformed stored value for {field}: {reason}")]
    Malformed { field: String, reason: String },

    #[error("entity deleted")]
    EntityDeleted,

    #[error("unknown entity_type: {0}")]
    UnknownEntityType(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ServerError::Malformed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServerError::NotFound {
                entity: "record".to_string(),
                id: "unknown".to_string(),
            },
            other => ServerError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ServerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ServerError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Malformed {
            field: "data".to_string(),
            reason: err.to_string(),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
