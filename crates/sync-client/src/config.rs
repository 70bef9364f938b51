//! # Sync Client Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SYNC_SERVER_URL=https://sync.example.com                           │
//! │     SYNC_AUTH_TOKEN=...                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/order-sync/client.toml (Linux)                           │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! base_url = "https://sync.example.com"
//! auth_token = "dev-token"
//!
//! [sync]
//! push_interval_ms = 30000
//! sse_debounce_ms = 100
//! pull_page_size = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Default push timer interval (§4.6: "every pushIntervalMs (default 30s)").
pub const DEFAULT_PUSH_INTERVAL_MS: u64 = 30_000;

/// SSE debounce window (§4.6: "reset a debounce timer (default 100ms)").
pub const DEFAULT_SSE_DEBOUNCE_MS: u64 = 100;

/// Page size for incremental pulls (§4.4: "GET /sync/pull?since=cursor&limit=100").
pub const DEFAULT_PULL_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTimingConfig {
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
    #[serde(default = "default_sse_debounce_ms")]
    pub sse_debounce_ms: u64,
    #[serde(default = "default_pull_page_size")]
    pub pull_page_size: u32,
}

fn default_push_interval_ms() -> u64 {
    DEFAULT_PUSH_INTERVAL_MS
}
fn default_sse_debounce_ms() -> u64 {
    DEFAULT_SSE_DEBOUNCE_MS
}
fn default_pull_page_size() -> u32 {
    DEFAULT_PULL_PAGE_SIZE
}

impl Default for SyncTimingConfig {
    fn default() -> Self {
        SyncTimingConfig {
            push_interval_ms: DEFAULT_PUSH_INTERVAL_MS,
            sse_debounce_ms: DEFAULT_SSE_DEBOUNCE_MS,
            pull_page_size: DEFAULT_PULL_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncTimingConfig,
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        SyncConfig {
            server: ServerConfig {
                base_url: base_url.into(),
                auth_token: None,
            },
            sync: SyncTimingConfig::default(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.server.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> SyncResult<Url> {
        Url::parse(&self.server.base_url).map_err(SyncError::from)
    }

    /// Loads config from a TOML file, falling back to environment
    /// variables for the server URL and token when the file is absent.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if path.exists() {
            debug!(path = %path.display(), "loading sync config");
            let text = std::fs::read_to_string(path)?;
            let config: SyncConfig = toml::from_str(&text)?;
            return Ok(config);
        }

        info!(path = %path.display(), "no sync config file found, using environment defaults");
        let base_url = std::env::var("SYNC_SERVER_URL")
            .map_err(|_| SyncError::InvalidConfig("SYNC_SERVER_URL not set".into()))?;
        let mut config = SyncConfig::new(base_url);
        if let Ok(token) = std::env::var("SYNC_AUTH_TOKEN") {
            config = config.with_auth_token(token);
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Default config file location, following the platform config-dir
    /// convention (`~/.config/order-sync/client.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "order-sync")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let config = SyncConfig::new("https://sync.example.com").with_auth_token("tok");
        let text = toml::to_string_pretty(&config).unwrap();
        let back: SyncConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.server.base_url, "https://sync.example.com");
        assert_eq!(back.server.auth_token.as_deref(), Some("tok"));
        assert_eq!(back.sync.push_interval_ms, DEFAULT_PUSH_INTERVAL_MS);
    }

    #[test]
    fn base_url_parses() {
        let config = SyncConfig::new("https://sync.example.com");
        assert!(config.base_url().is_ok());
    }
}
