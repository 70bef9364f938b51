//! Order Sync server configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults, mirroring the layered config convention `sync-client` uses
//! for the opposite side of this contract (env vars > defaults; no TOML
//! file on the server since there's one deployment, not many desktops).

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ConfigError;

/// Order Sync server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the axum listener binds to.
    pub bind_addr: String,

    /// SQLite database file path (`:memory:` for ephemeral/test runs).
    pub database_path: String,

    /// Coarse bearer token gating all `/sync/*` routes. `None` disables
    /// the check (local development only).
    pub auth_token: Option<String>,

    /// Default page size the server will serve from `/sync/pull` when
    /// the client omits `limit`.
    pub default_pull_limit: i64,

    /// SSE keepalive ping interval in seconds (§6: "~30s").
    pub sse_ping_interval_secs: u64,
}

impl ServerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = ServerConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "order-sync-server.sqlite".to_string()),

            auth_token: env::var("SYNC_AUTH_TOKEN").ok(),

            default_pull_limit: env::var("DEFAULT_PULL_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEFAULT_PULL_LIMIT".to_string()))?,

            sse_ping_interval_secs: env::var("SSE_PING_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SSE_PING_INTERVAL_SECS".to_string()))?,
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_defaults_when_env_unset() {
        std::env::remove_var("BIND_ADDR");
        std::env::remove_var("DATABASE_PATH");
        std::env::remove_var("SYNC_AUTH_TOKEN");
        let config = ServerConfig::load().unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.default_pull_limit, 100);
        assert!(config.auth_token.is_none());
    }
}
