//! Mock dispatch queue for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DispatchMessage, DispatchQueue, QueueError, Result};

/// Dispatch queue that records every accepted message.
#[derive(Default)]
pub struct MockDispatchQueue {
    sent: RwLock<Vec<DispatchMessage>>,
    fail_on_send: RwLock<bool>,
    /// Remaining forced failures per event id.
    fail_times: RwLock<HashMap<String, usize>>,
    send_delay: RwLock<Option<Duration>>,
    attempts: AtomicUsize,
}

impl MockDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send until cleared.
    pub async fn set_fail_on_send(&self, fail: bool) {
        *self.fail_on_send.write().await = fail;
    }

    /// Fail the next `times` sends of the given event.
    pub async fn fail_event_times(&self, event_id: &str, times: usize) {
        self.fail_times
            .write()
            .await
            .insert(event_id.to_string(), times);
    }

    /// Delay every send, to exercise enqueue timeouts.
    pub async fn set_send_delay(&self, delay: Option<Duration>) {
        *self.send_delay.write().await = delay;
    }

    pub async fn sent(&self) -> Vec<DispatchMessage> {
        self.sent.read().await.clone()
    }

    /// Number of sends attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DispatchQueue for MockDispatchQueue {
    async fn send(&self, message: &DispatchMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.send_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_on_send.read().await {
            return Err(QueueError::Send("Mock send failure".to_string()));
        }

        {
            let mut fail_times = self.fail_times.write().await;
            if let Some(remaining) = fail_times.get_mut(&message.event_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(QueueError::Send(format!(
                        "Mock send failure for {}",
                        message.event_id
                    )));
                }
            }
        }

        self.sent.write().await.push(message.clone());
        Ok(())
    }
}
