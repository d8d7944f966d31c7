//! [MODULE J] SSE fan-out registry (§4.J). Each viewer gets its own
//! bounded channel rather than subscribing to one shared `broadcast`
//! channel, so a slow viewer only drops messages addressed to it.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

const VIEWER_CHANNEL_CAPACITY: usize = 10;

/// A registry of per-viewer channels for one event type, grounded in the
/// teacher's `progress_events` SSE handler but generalized from a single
/// shared `broadcast::Sender` into per-viewer bounded channels per the
/// fan-out/slow-consumer-drop design called for here.
pub struct Broadcaster<T: Clone + Send + 'static> {
    viewers: RwLock<Vec<mpsc::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            viewers: RwLock::new(Vec::new()),
        })
    }

    /// Registers a new viewer and returns its receiver.
    pub async fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(VIEWER_CHANNEL_CAPACITY);
        self.viewers.write().await.push(tx);
        rx
    }

    /// Broadcasts to every registered viewer. A full channel means a slow
    /// viewer; the message is dropped for that viewer only, silently, per
    /// §4.J ("dropped messages are not retried").
    pub async fn broadcast(&self, value: T) {
        let mut viewers = self.viewers.write().await;
        viewers.retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            viewers: RwLock::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_viewer_drops_without_blocking_others() {
        let broadcaster: Arc<Broadcaster<u32>> = Broadcaster::new();
        let mut fast = broadcaster.subscribe().await;
        let mut slow = broadcaster.subscribe().await;

        for i in 0..(VIEWER_CHANNEL_CAPACITY as u32 + 5) {
            broadcaster.broadcast(i).await;
        }

        // The fast receiver drains promptly and sees the latest sends it
        // had room for; the slow one never polled, so its channel filled
        // and later broadcasts were dropped for it rather than blocking.
        assert!(fast.try_recv().is_ok());
        let mut slow_count = 0;
        while slow.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(slow_count, VIEWER_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn closed_viewer_is_pruned() {
        let broadcaster: Arc<Broadcaster<u32>> = Broadcaster::new();
        let rx = broadcaster.subscribe().await;
        drop(rx);
        broadcaster.broadcast(1).await;
        assert_eq!(broadcaster.viewers.read().await.len(), 0);
    }
}
