//! Daemon-level error type. Thin — almost everything bottoms out in
//! `sync_store::DbError` or `sync_client::SyncError`; this only adds the
//! daemon's own config resolution failure.

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] sync_store::DbError),

    #[error(transparent)]
    Sync(#[from] sync_client::SyncError),
}
