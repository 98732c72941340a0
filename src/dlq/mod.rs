//! Dead letters: work the pipe stopped retrying.
//!
//! Provides a trait-based abstraction for parking work the pipe gave up on,
//! for manual review and replay.
//!
//! Two things end up here:
//! - a single dispatch message whose enqueue retries were exhausted
//! - a whole stream batch whose delivery retries were exhausted
//!
//! A dead letter is serialized as JSON with the payload, the reason, the
//! attempt count and the component that gave up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AwsConfig;
use crate::model::ChangeEvent;
use crate::queue::DispatchMessage;

#[cfg(feature = "sqs")]
pub mod sqs;

#[cfg(feature = "sqs")]
pub use sqs::SqsDeadLetterPublisher;

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to serialize dead letter: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),
}

/// What was given up on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeadLetterPayload {
    /// One enrichment output that could not be enqueued.
    Message(DispatchMessage),
    /// A stream batch that could not be delivered.
    Batch {
        lineage: String,
        events: Vec<ChangeEvent>,
    },
}

/// A failed unit of work with its failure context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub payload: DeadLetterPayload,
    pub rejection_reason: String,
    pub attempts: u32,
    pub source_component: String,
    pub occurred_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl DeadLetter {
    /// Create a dead letter for a message whose enqueue retries ran out.
    pub fn from_dispatch_failure(
        message: &DispatchMessage,
        error: &str,
        attempts: u32,
        source_component: &str,
    ) -> Self {
        Self {
            payload: DeadLetterPayload::Message(message.clone()),
            rejection_reason: format!("Enqueue failed after {} attempts: {}", attempts, error),
            attempts,
            source_component: source_component.to_string(),
            occurred_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create a dead letter for a batch whose delivery retries ran out.
    pub fn from_batch_failure(
        lineage: &str,
        events: &[ChangeEvent],
        error: &str,
        attempts: u32,
        source_component: &str,
    ) -> Self {
        Self {
            payload: DeadLetterPayload::Batch {
                lineage: lineage.to_string(),
                events: events.to_vec(),
            },
            rejection_reason: format!(
                "Batch delivery failed after {} attempts: {}",
                attempts, error
            ),
            attempts,
            source_component: source_component.to_string(),
            occurred_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a context key, e.g. the sequence range of a batch.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> Result<String, DlqError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Number of change events this dead letter covers.
    pub fn event_count(&self) -> usize {
        match &self.payload {
            DeadLetterPayload::Message(_) => 1,
            DeadLetterPayload::Batch { events, .. } => events.len(),
        }
    }
}

/// Trait for publishing dead letters.
///
/// Implementations:
/// - `NoopDeadLetterPublisher`: logs only
/// - `ChannelDeadLetterPublisher`: in-process channel
/// - `SqsDeadLetterPublisher`: Amazon SQS (feature `sqs`)
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    /// Park one dead letter. Failures are logged by callers, never retried.
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;

    /// `false` when dead letters are only logged.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Logs dead letters at warn level and drops them.
///
/// The fallback when `dlq.queue_url` is unset.
pub struct NoopDeadLetterPublisher;

#[async_trait]
impl DeadLetterPublisher for NoopDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        warn!(
            reason = %dead_letter.rejection_reason,
            source = %dead_letter.source_component,
            events = dead_letter.event_count(),
            "No dead letter queue, dropping after log"
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Hands dead letters to an unbounded channel.
///
/// The standalone binary drains it into the log; tests inspect it.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    /// Publisher plus the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        info!(
            reason = %dead_letter.rejection_reason,
            events = dead_letter.event_count(),
            "Dead letter parked in channel"
        );
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}

/// `dlq` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    /// SQS queue URL for dead letters.
    pub queue_url: Option<String>,
}

impl DlqConfig {
    /// Whether a queue URL was given.
    pub fn is_configured(&self) -> bool {
        self.queue_url.is_some()
    }
}

/// Create a DLQ publisher based on configuration.
///
/// Falls back to the noop publisher when nothing is configured or the
/// configured backend is not compiled in.
pub async fn create_publisher(config: &DlqConfig, aws: &AwsConfig) -> Arc<dyn DeadLetterPublisher> {
    match &config.queue_url {
        #[cfg(feature = "sqs")]
        Some(queue_url) => {
            let sdk_config = crate::utils::aws::load_aws_config(aws).await;
            Arc::new(SqsDeadLetterPublisher::new(
                &sdk_config,
                queue_url,
                aws.endpoint_url.as_deref(),
            ))
        }
        #[cfg(not(feature = "sqs"))]
        Some(queue_url) => {
            let _ = aws;
            warn!(queue_url = %queue_url, "SQS DLQ configured but feature 'sqs' not enabled, using noop");
            Arc::new(NoopDeadLetterPublisher)
        }
        None => {
            debug!("No DLQ configured, using noop publisher");
            Arc::new(NoopDeadLetterPublisher)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnrichedRecord, EventName};
    use serde_json::{json, Map};

    fn make_message(event_id: &str) -> DispatchMessage {
        DispatchMessage::new(
            event_id,
            "appt-1",
            EnrichedRecord::without_preference(Map::new()).into(),
        )
    }

    #[test]
    fn test_from_dispatch_failure() {
        let dl = DeadLetter::from_dispatch_failure(&make_message("e1"), "throttled", 4, "pipe");

        assert_eq!(dl.attempts, 4);
        assert_eq!(dl.source_component, "pipe");
        assert!(dl.rejection_reason.contains("4 attempts"));
        assert!(dl.rejection_reason.contains("throttled"));
        assert_eq!(dl.event_count(), 1);
    }

    #[test]
    fn test_from_batch_failure() {
        let events = vec![
            ChangeEvent::new("e1", EventName::Insert, "a", None, "1"),
            ChangeEvent::new("e2", EventName::Insert, "b", None, "2"),
        ];
        let dl = DeadLetter::from_batch_failure("lineage-0000", &events, "directory down", 10, "pipe");

        assert_eq!(dl.event_count(), 2);
        match &dl.payload {
            DeadLetterPayload::Batch { lineage, events } => {
                assert_eq!(lineage, "lineage-0000");
                assert_eq!(events[1].event_id, "e2");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_with_metadata() {
        let dl = DeadLetter::from_dispatch_failure(&make_message("e1"), "x", 1, "pipe")
            .with_metadata("lineage", "lineage-0003");
        assert_eq!(dl.metadata.get("lineage").map(String::as_str), Some("lineage-0003"));
    }

    #[test]
    fn test_dead_letter_json_shape() {
        let dl = DeadLetter::from_dispatch_failure(&make_message("e1"), "x", 2, "pipe");
        let value: serde_json::Value = serde_json::from_str(&dl.to_json().unwrap()).unwrap();

        assert_eq!(value["payload"]["kind"], json!("message"));
        assert_eq!(value["payload"]["event_id"], json!("e1"));
        assert_eq!(value["payload"]["body"]["preferredMethod"], json!("none"));
        assert_eq!(value["attempts"], json!(2));
    }

    #[tokio::test]
    async fn test_noop_publisher_succeeds() {
        let publisher = NoopDeadLetterPublisher;
        let dl = DeadLetter::from_dispatch_failure(&make_message("e1"), "x", 1, "pipe");
        assert!(publisher.publish(dl).await.is_ok());
        assert!(!publisher.is_configured());
    }

    #[tokio::test]
    async fn test_channel_publisher_sends() {
        let (publisher, mut receiver) = ChannelDeadLetterPublisher::new();
        let dl = DeadLetter::from_dispatch_failure(&make_message("e1"), "x", 1, "pipe");

        publisher.publish(dl).await.unwrap();

        let received = receiver.recv().await.expect("Should receive dead letter");
        assert_eq!(received.source_component, "pipe");
        assert!(publisher.is_configured());
    }

    #[test]
    fn test_dlq_config_default_not_configured() {
        assert!(!DlqConfig::default().is_configured());
    }

    #[tokio::test]
    async fn test_create_publisher_default_is_noop() {
        let publisher = create_publisher(&DlqConfig::default(), &AwsConfig::default()).await;
        assert!(!publisher.is_configured());
    }
}
