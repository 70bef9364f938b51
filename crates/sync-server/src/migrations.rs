//! # Server Store Migrations
//!
//! Embedded SQL migrations for the authoritative change-log store,
//! mirroring `sync_store::migrations` on the client side.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::ServerResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/sqlite");

pub async fn run_migrations(pool: &SqlitePool) -> ServerResult<()> {
    info!("running server store migrations");
    MIGRATOR.run(pool).await?;
    Ok(())
}
