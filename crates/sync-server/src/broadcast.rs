//! # SSE Broadcaster
//!
//! Fans a lightweight "something changed" notification out to every
//! connected `/sync/events` subscriber, mirroring the teacher's websocket
//! `hub.rs` broadcast pattern over `tokio::sync::broadcast` instead of a
//! per-connection `mpsc`. A subscriber that falls behind the channel's
//! capacity is dropped — it reconnects and re-pulls from its last known
//! `sync_id`, since SSE here is a liveness hint, not an ordering guarantee.

use tokio::sync::broadcast;
use tracing::warn;

use crate::protocol::SseSyncEvent;
use sync_core::EntityType;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SyncBroadcaster {
    tx: broadcast::Sender<SseSyncEvent>,
}

impl SyncBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        SyncBroadcaster { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseSyncEvent> {
        self.tx.subscribe()
    }

    /// Broadcasts a change notification. No-ops if nobody is listening.
    pub fn notify_change(&self, entity_type: EntityType, entity_id: Uuid, sync_id: i64) {
        let event = SseSyncEvent::changed(entity_type, entity_id, sync_id);
        if self.tx.send(event).is_err() {
            warn!("sse broadcast had no subscribers");
        }
    }
}

impl Default for SyncBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a subscriber's receiver into the event stream consumed by the
/// `/sync/events` handler. Lag (the receiver falling behind the ring
/// buffer) ends the stream; the client reconnects.
pub fn subscriber_stream(
    mut rx: broadcast::Receiver<SseSyncEvent>,
) -> impl futures_util::Stream<Item = SseSyncEvent> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sse subscriber lagged; disconnecting");
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_change_notifications() {
        let hub = SyncBroadcaster::new();
        let mut rx = hub.subscribe();
        let entity_id = Uuid::new_v4();
        hub.notify_change(EntityType::Order, entity_id, 7);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "sync");
        assert_eq!(event.sync_id, Some(7));
        assert_eq!(event.entity_id, Some(entity_id));
    }
}
