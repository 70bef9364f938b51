//! # Sync Orchestrator
//!
//! Serializes push and pull behind one FIFO task queue, reacts to
//! connectivity transitions and incoming SSE notifications, and exposes
//! status to subscribers. Mirrors the teacher's `SyncAgent` shape — a
//! struct holding component handles plus a spawned router loop — with the
//! websocket message router replaced by a queue of sync tasks and the
//! `Arc<RwLock<SyncStatus>>` + explicit emit calls replaced by a
//! `tokio::sync::watch` channel, the idiomatic Rust realization of the
//! same subscribe/getSnapshot observer contract.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use sync_store::Database;

use crate::error::SyncResult;
use crate::invalidation::CacheInvalidator;
use crate::pull::PullEngine;
use crate::push::PushEngine;
use crate::transport::SyncTransport;

/// Whether the orchestrator currently believes the server is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Injectable source of connectivity transitions, so tests can drive the
/// orchestrator without a real network. The default implementation polls
/// the server's health endpoint; tests substitute a fake that's driven
/// directly.
pub trait ConnectivityMonitor: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<ConnectivityState>;
}

/// Polls `GET /healthz` on an interval and republishes the result as
/// connectivity transitions. Not exercised by the test suite, which
/// injects a fake monitor instead, but provided as the production
/// default per the orchestrator's constructor contract.
pub struct ReqwestConnectivityMonitor {
    state_tx: watch::Sender<ConnectivityState>,
}

impl ReqwestConnectivityMonitor {
    pub fn spawn(transport: SyncTransport, poll_interval: Duration) -> Arc<Self> {
        let (state_tx, _rx) = watch::channel(ConnectivityState::Offline);
        let monitor = Arc::new(ReqwestConnectivityMonitor { state_tx });
        let tx = monitor.state_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = transport.snapshot().await.is_ok() || transport.pull(0, 1).await.is_ok();
                let state = if reachable {
                    ConnectivityState::Online
                } else {
                    ConnectivityState::Offline
                };
                let _ = tx.send_if_modified(|current| {
                    if *current != state {
                        *current = state;
                        true
                    } else {
                        false
                    }
                });
            }
        });
        monitor
    }
}

impl ConnectivityMonitor for ReqwestConnectivityMonitor {
    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }
}

/// Current sync status for external subscribers.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub connectivity: ConnectivityState,
    pub is_syncing: bool,
    pub pending_count: i64,
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            connectivity: ConnectivityState::Offline,
            is_syncing: false,
            pending_count: 0,
            last_push_at: None,
            last_pull_at: None,
            last_error: None,
        }
    }
}

/// One unit of work in the orchestrator's FIFO queue. A single Tokio task
/// owns the receiving end, so at most one push or pull ever runs at once
/// regardless of how many triggers fired concurrently.
enum SyncTask {
    Push,
    Pull,
}

/// Handle returned by [`SyncOrchestrator::start`] for external control:
/// requesting an immediate sync, reading status, or shutting down.
#[derive(Clone)]
pub struct SyncOrchestratorHandle {
    task_tx: mpsc::Sender<SyncTask>,
    status_rx: watch::Receiver<SyncStatus>,
    shutdown_tx: mpsc::Sender<()>,
    /// Abort handles for every background trigger task spawned by `start`
    /// (push timer, connectivity watcher, SSE listener) besides the queue
    /// itself. `AbortHandle` is cheaply `Clone`, unlike `JoinHandle`, so it
    /// fits this already-`Clone` handle without an `Arc` wrapper.
    background_tasks: Vec<tokio::task::AbortHandle>,
}

impl SyncOrchestratorHandle {
    /// Returns a receiver that's notified whenever any status field
    /// changes; clone it freely, it's cheap and `Send + Sync`.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.status_rx.borrow().clone()
    }

    /// Enqueues an immediate push, coalescing with the regular timer.
    pub async fn request_push(&self) {
        let _ = self.task_tx.send(SyncTask::Push).await;
    }

    /// Enqueues an immediate pull, typically in reaction to an SSE event.
    pub async fn request_pull(&self) {
        let _ = self.task_tx.send(SyncTask::Pull).await;
    }

    /// Stops the queue (in-flight work is allowed to finish; queued tasks
    /// are dropped) and aborts the push timer, connectivity watcher and SSE
    /// listener outright, so none of them can originate a new HTTP
    /// request, store write or subscriber notification afterward (§5).
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        for task in &self.background_tasks {
            task.abort();
        }
    }
}

/// Constructs and drives the push/pull engines behind one serialized
/// queue. `init` takes the already-assembled collaborators (store,
/// transport) per the testability requirement: callers inject fakes for
/// the transport and the connectivity monitor in tests.
pub struct SyncOrchestrator {
    db: Database,
    transport: SyncTransport,
    invalidator: Arc<dyn CacheInvalidator>,
    pull_page_size: u32,
    push_interval: Duration,
    sse_debounce: Duration,
    connectivity: Arc<dyn ConnectivityMonitor>,
}

impl SyncOrchestrator {
    pub fn init(
        db: Database,
        transport: SyncTransport,
        invalidator: Arc<dyn CacheInvalidator>,
        pull_page_size: u32,
        push_interval: Duration,
        sse_debounce: Duration,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        SyncOrchestrator {
            db,
            transport,
            invalidator,
            pull_page_size,
            push_interval,
            sse_debounce,
            connectivity,
        }
    }

    /// Spawns the queue-owning task and the triggers that feed it (push
    /// timer, connectivity transitions, debounced SSE), and returns a
    /// handle for external control. The queue task itself runs until
    /// `shutdown()` is called on the returned handle.
    pub async fn start(self) -> SyncOrchestratorHandle {
        let push_engine = Arc::new(PushEngine::new(
            self.db.clone(),
            self.transport.clone(),
            self.invalidator.clone(),
        ));
        let pull_engine = Arc::new(PullEngine::new(
            self.db.clone(),
            self.transport.clone(),
            self.invalidator.clone(),
            self.pull_page_size,
        ));

        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (task_tx, task_rx) = mpsc::channel::<SyncTask>(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::run_queue(
            push_engine.clone(),
            pull_engine.clone(),
            self.db.clone(),
            status_tx.clone(),
            task_rx,
            shutdown_rx,
        ));

        let push_timer = tokio::spawn(Self::run_push_timer(task_tx.clone(), self.push_interval));
        let connectivity_watcher = tokio::spawn(Self::run_connectivity_watcher(
            self.connectivity.clone(),
            task_tx.clone(),
            status_tx.clone(),
        ));
        let sse_listener = tokio::spawn(Self::run_sse_listener(
            self.transport.clone(),
            task_tx.clone(),
            self.sse_debounce,
        ));

        SyncOrchestratorHandle {
            task_tx,
            status_rx,
            shutdown_tx,
            background_tasks: vec![
                push_timer.abort_handle(),
                connectivity_watcher.abort_handle(),
                sse_listener.abort_handle(),
            ],
        }
    }

    /// The single task that owns the FIFO queue: at most one push or
    /// pull runs at a time, in the order enqueued.
    async fn run_queue(
        push_engine: Arc<PushEngine>,
        pull_engine: Arc<PullEngine>,
        db: Database,
        status_tx: watch::Sender<SyncStatus>,
        mut task_rx: mpsc::Receiver<SyncTask>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        if let Err(e) = pull_engine.run_initial_snapshot_if_needed().await {
            error!(error = %e, "initial snapshot failed");
        }

        loop {
            tokio::select! {
                Some(task) = task_rx.recv() => {
                    status_tx.send_modify(|s| s.is_syncing = true);
                    let result = match task {
                        SyncTask::Push => Self::run_push(&push_engine, &pull_engine).await,
                        SyncTask::Pull => pull_engine.run_incremental().await.map(|_| ()),
                    };
                    let pending = db.outbox().count_pending().await.unwrap_or(0);
                    status_tx.send_modify(|s| {
                        s.is_syncing = false;
                        s.pending_count = pending;
                        match result {
                            Ok(()) => s.last_error = None,
                            Err(ref e) => {
                                warn!(error = %e, "sync task failed");
                                s.last_error = Some(e.to_string());
                            }
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("sync orchestrator queue stopping");
                    break;
                }
            }
        }
    }

    /// A push followed by an incremental pull: pushing first gives the
    /// server a chance to apply local work before the pull page is drawn,
    /// reducing unnecessary rebases of ops the push just resolved.
    async fn run_push(push_engine: &PushEngine, pull_engine: &PullEngine) -> SyncResult<()> {
        let summary = push_engine.run_once().await?;
        debug!(processed = summary.processed, sent = summary.sent, "push cycle complete");
        pull_engine.run_incremental().await?;
        Ok(())
    }

    async fn run_push_timer(task_tx: mpsc::Sender<SyncTask>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if task_tx.send(SyncTask::Push).await.is_err() {
                break;
            }
        }
    }

    async fn run_connectivity_watcher(
        monitor: Arc<dyn ConnectivityMonitor>,
        task_tx: mpsc::Sender<SyncTask>,
        status_tx: watch::Sender<SyncStatus>,
    ) {
        let mut rx = monitor.subscribe();
        loop {
            let state = *rx.borrow();
            status_tx.send_modify(|s| s.connectivity = state);
            if state == ConnectivityState::Online {
                let _ = task_tx.send(SyncTask::Push).await;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Consumes the SSE stream and enqueues a pull after a short quiet
    /// period, so a burst of notifications collapses into one pull
    /// rather than one per event.
    async fn run_sse_listener(transport: SyncTransport, task_tx: mpsc::Sender<SyncTask>, debounce: Duration) {
        loop {
            let mut stream = match transport.subscribe_events().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "sse connect failed, retrying shortly");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            loop {
                match tokio::time::timeout(debounce, stream.next()).await {
                    Ok(Some(event)) => {
                        debug!(event = %event.event, "sse event received");
                        // Drain any further events already queued within the debounce window.
                        while tokio::time::timeout(debounce, stream.next()).await.is_ok() {}
                        if task_tx.send(SyncTask::Pull).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(_elapsed) => continue,
                }
            }

            warn!("sse stream ended, reconnecting");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::NoOpInvalidator;
    use sync_store::DbConfig;

    struct FixedConnectivity(watch::Sender<ConnectivityState>);

    impl ConnectivityMonitor for FixedConnectivity {
        fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
            self.0.subscribe()
        }
    }

    #[tokio::test]
    async fn status_defaults_to_offline_and_idle() {
        let status = SyncStatus::default();
        assert_eq!(status.connectivity, ConnectivityState::Offline);
        assert!(!status.is_syncing);
        assert_eq!(status.pending_count, 0);
    }

    #[tokio::test]
    async fn handle_reports_initial_snapshot_before_any_task() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = crate::config::SyncConfig::new("http://127.0.0.1:0");
        let transport = SyncTransport::new(&config).unwrap();
        let (tx, _rx) = watch::channel(ConnectivityState::Offline);
        let monitor = Arc::new(FixedConnectivity(tx));

        let orchestrator = SyncOrchestrator::init(
            db,
            transport,
            Arc::new(NoOpInvalidator),
            100,
            Duration::from_secs(3600),
            Duration::from_millis(100),
            monitor,
        );
        let handle = orchestrator.start().await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.pending_count, 0);
        handle.shutdown().await;
    }

    /// §8 testable property: after `stop()`, no new HTTP request, store
    /// write, or subscriber notification originates from the orchestrator.
    /// Drives the connectivity monitor through a transition after shutdown
    /// and asserts the watcher (aborted) never republishes it into status —
    /// if it had, `connectivity` would flip to `Online` and it would have
    /// enqueued a push, which would in turn attempt an HTTP call.
    #[tokio::test]
    async fn shutdown_stops_connectivity_watcher_from_notifying_subscribers() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = crate::config::SyncConfig::new("http://127.0.0.1:0");
        let transport = SyncTransport::new(&config).unwrap();
        let (conn_tx, _rx) = watch::channel(ConnectivityState::Offline);
        let monitor = Arc::new(FixedConnectivity(conn_tx.clone()));

        let orchestrator = SyncOrchestrator::init(
            db,
            transport,
            Arc::new(NoOpInvalidator),
            100,
            Duration::from_secs(3600),
            Duration::from_millis(100),
            monitor,
        );
        let handle = orchestrator.start().await;
        handle.shutdown().await;

        // Give the aborted tasks a chance to actually stop before probing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut status_rx = handle.subscribe();
        conn_tx.send(ConnectivityState::Online).unwrap();

        // No further status notification should ever arrive: the watcher
        // task was aborted, so it can't observe or republish the change.
        let changed = tokio::time::timeout(Duration::from_millis(100), status_rx.changed()).await;
        assert!(changed.is_err(), "status changed after shutdown");
        assert_eq!(handle.snapshot().connectivity, ConnectivityState::Offline);
    }
}
