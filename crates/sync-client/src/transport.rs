//! # HTTP/SSE Transport
//!
//! Thin wrapper over `reqwest` implementing the wire contract of spec §6:
//! `POST /sync/push`, `GET /sync/pull`, `GET /sync/snapshot`, and the
//! `GET /sync/events` SSE stream (consumed via `eventsource-stream`).

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{PullResponse, PushRequest, PushResponse, SnapshotResponse, SseSyncEvent};

/// HTTP/SSE client for the sync server, injected into the push/pull
/// engines and the orchestrator's SSE listener.
#[derive(Debug, Clone)]
pub struct SyncTransport {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl SyncTransport {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(SyncError::from)?;
        Ok(SyncTransport {
            client,
            base_url,
            auth_token: config.server.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> Url {
        self.base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone())
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        debug!(operations = request.operations.len(), "posting push batch");
        let response = self
            .authorize(self.client.post(self.url("/sync/push")))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "push failed with status {}",
                response.status()
            )));
        }

        response
            .json::<PushResponse>()
            .await
            .map_err(|e| SyncError::Protocol(format!("malformed push response: {e}")))
    }

    pub async fn pull(&self, since: i64, limit: u32) -> SyncResult<PullResponse> {
        let mut url = self.url("/sync/pull");
        url.query_pairs_mut()
            .append_pair("since", &since.to_string())
            .append_pair("limit", &limit.to_string());

        let response = self.authorize(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "pull failed with status {}",
                response.status()
            )));
        }

        response
            .json::<PullResponse>()
            .await
            .map_err(|e| SyncError::Protocol(format!("malformed pull response: {e}")))
    }

    pub async fn snapshot(&self) -> SyncResult<SnapshotResponse> {
        let response = self
            .authorize(self.client.get(self.url("/sync/snapshot")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "snapshot failed with status {}",
                response.status()
            )));
        }

        response
            .json::<SnapshotResponse>()
            .await
            .map_err(|e| SyncError::Protocol(format!("malformed snapshot response: {e}")))
    }

    /// Opens the `/sync/events` SSE stream. Each item is a parsed
    /// [`SseSyncEvent`]; malformed frames are logged and skipped rather
    /// than terminating the stream, since one bad frame shouldn't kill
    /// an otherwise-healthy connection.
    pub async fn subscribe_events(
        &self,
    ) -> SyncResult<impl Stream<Item = SseSyncEvent> + Send + Unpin> {
        let response = self
            .authorize(self.client.get(self.url("/sync/events")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "sse connect failed with status {}",
                response.status()
            )));
        }

        let stream = response.bytes_stream().eventsource().filter_map(|frame| async move {
            match frame {
                Ok(event) => match serde_json::from_str::<SseSyncEvent>(&event.data) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        warn!(error = %e, data = %event.data, "dropping malformed sse frame");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "sse stream error, dropping frame");
                    None
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
