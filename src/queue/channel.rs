//! In-process dispatch queue.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{DispatchMessage, DispatchQueue, QueueError, Result};

/// Dispatch queue backed by an unbounded mpsc channel.
///
/// Used for standalone mode, where a local task consumes the receiver.
pub struct ChannelDispatchQueue {
    sender: mpsc::UnboundedSender<DispatchMessage>,
}

impl ChannelDispatchQueue {
    /// Returns the queue and a receiver for consuming dispatched messages.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DispatchQueue for ChannelDispatchQueue {
    async fn send(&self, message: &DispatchMessage) -> Result<()> {
        debug!(
            event_id = %message.event_id,
            outcome = message.body.outcome(),
            "Dispatching to channel queue"
        );
        self.sender
            .send(message.clone())
            .map_err(|e| QueueError::Send(format!("receiver dropped: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnrichedRecord, EnrichmentOutput};
    use serde_json::Map;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (queue, mut rx) = ChannelDispatchQueue::new();
        for id in ["e1", "e2"] {
            let body: EnrichmentOutput = EnrichedRecord::without_preference(Map::new()).into();
            queue.send(&DispatchMessage::new(id, "k", body)).await.unwrap();
        }

        assert_eq!(rx.recv().await.unwrap().event_id, "e1");
        assert_eq!(rx.recv().await.unwrap().event_id, "e2");
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (queue, rx) = ChannelDispatchQueue::new();
        drop(rx);

        let body: EnrichmentOutput = EnrichedRecord::without_preference(Map::new()).into();
        let result = queue.send(&DispatchMessage::new("e1", "k", body)).await;
        assert!(matches!(result, Err(QueueError::Send(_))));
    }
}
