//! Dispatch queue for enrichment outputs.
//!
//! This module contains:
//! - `DispatchMessage`: one enrichment output plus its routing info
//! - `DispatchQueue` trait: durable hand-off to downstream consumers
//! - `ChannelDispatchQueue`: in-process channel (standalone mode)
//! - `MockDispatchQueue`: records sends, with failure injection
//! - `SqsDispatchQueue`: Amazon SQS (feature `sqs`)
//!
//! The message body is exactly the serialized `EnrichmentOutput`.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::model::EnrichmentOutput;

pub mod channel;
pub mod mock;

#[cfg(feature = "sqs")]
pub mod sqs;

pub use channel::ChannelDispatchQueue;
pub use mock::MockDispatchQueue;

#[cfg(feature = "sqs")]
pub use sqs::SqsDispatchQueue;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur sending to the dispatch queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Enqueue timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single output bound for the dispatch queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchMessage {
    /// Id of the change event this output was produced from.
    pub event_id: String,
    /// Key of the originating record; ordering is kept per key.
    pub partition_key: String,
    pub body: EnrichmentOutput,
}

impl DispatchMessage {
    pub fn new(
        event_id: impl Into<String>,
        partition_key: impl Into<String>,
        body: EnrichmentOutput,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            partition_key: partition_key.into(),
            body,
        }
    }

    /// Serialized message body.
    pub fn body_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }
}

/// Interface for the dispatch queue.
///
/// Accepts messages concurrently and stores each durably until consumed.
///
/// Implementations:
/// - `ChannelDispatchQueue`: in-process mpsc channel
/// - `MockDispatchQueue`: for testing
/// - `SqsDispatchQueue`: Amazon SQS
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Enqueue one message.
    async fn send(&self, message: &DispatchMessage) -> Result<()>;
}
