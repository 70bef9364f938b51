//! # Server Database Pool
//!
//! Connection pool for the authoritative store. Mirrors `sync_store::pool`
//! (same WAL-mode reasoning applies: the push handler and SSE fanout share
//! one pool).

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{ServerError, ServerResult};
use crate::migrations;
use crate::repository::order::OrderRepository;
use crate::repository::order_line::OrderLineRepository;
use crate::repository::reference::{PartnerRepository, ProductRepository, UnitRepository};
use crate::ChangeLogRepository;

#[derive(Debug, Clone)]
pub struct ServerDbConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl ServerDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ServerDbConfig {
            database_path: path.into(),
            max_connections: 10,
            run_migrations: true,
        }
    }

    pub fn in_memory() -> Self {
        ServerDbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            run_migrations: true,
        }
    }
}

/// Handle to the authoritative store.
#[derive(Debug, Clone)]
pub struct ServerDatabase {
    pool: SqlitePool,
}

impl ServerDatabase {
    pub async fn new(config: ServerDbConfig) -> ServerResult<Self> {
        info!(path = %config.database_path.display(), "initializing server sync store");

        let connect_url = if config.database_path.as_os_str() == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| ServerError::Internal(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        let db = ServerDatabase { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn order_lines(&self) -> OrderLineRepository {
        OrderLineRepository::new(self.pool.clone())
    }

    pub fn partners(&self) -> PartnerRepository {
        PartnerRepository::new(self.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn units(&self) -> UnitRepository {
        UnitRepository::new(self.pool.clone())
    }

    pub fn change_log(&self) -> ChangeLogRepository {
        ChangeLogRepository::new(self.pool.clone())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_is_healthy() {
        let db = ServerDatabase::new(ServerDbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }
}
