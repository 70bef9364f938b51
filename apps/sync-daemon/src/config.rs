//! Daemon-level configuration: where the local store lives, plus the
//! sync-client configuration (server URL, auth token, timing knobs)
//! already defined by `sync_client::config::SyncConfig`.

use std::path::PathBuf;

use sync_client::SyncConfig;

use crate::error::DaemonError;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub database_path: PathBuf,
    pub sync: SyncConfig,
}

impl DaemonConfig {
    /// Loads the sync-client config from `ORDER_SYNC_CLIENT_CONFIG` (or the
    /// platform default path) and the local database path from
    /// `ORDER_SYNC_DB_PATH`, falling back to a file in the current
    /// directory so the daemon runs without any setup for local dev.
    pub fn load() -> Result<Self, DaemonError> {
        let config_path = std::env::var("ORDER_SYNC_CLIENT_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(SyncConfig::default_path)
            .ok_or_else(|| DaemonError::Config("could not resolve a client config path".into()))?;

        let sync = SyncConfig::load(&config_path).map_err(|e| DaemonError::Config(e.to_string()))?;

        let database_path = std::env::var("ORDER_SYNC_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("order-sync-client.sqlite"));

        Ok(DaemonConfig { database_path, sync })
    }
}
