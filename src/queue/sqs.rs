//! Amazon SQS dispatch queue.
//!
//! Standard and FIFO queues are both supported. For FIFO queues (url ends
//! in `.fifo`) the record key is the message group, so per-key order holds
//! on the consumer side too, and the event id deduplicates redeliveries.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client;
use tracing::{debug, info};

use super::{DispatchMessage, DispatchQueue, QueueError, Result};

/// Message attribute carrying the source event id.
pub const EVENT_ID_ATTR: &str = "eventId";

/// Message attribute carrying `enriched` or `soft_fail`.
pub const OUTCOME_ATTR: &str = "outcome";

/// SQS implementation of DispatchQueue.
pub struct SqsDispatchQueue {
    client: Client,
    queue_url: String,
    fifo: bool,
}

impl SqsDispatchQueue {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        queue_url: impl Into<String>,
        endpoint_url: Option<&str>,
    ) -> Self {
        let client = match endpoint_url {
            Some(endpoint) => {
                let config = aws_sdk_sqs::config::Builder::from(sdk_config)
                    .endpoint_url(endpoint)
                    .build();
                Client::from_conf(config)
            }
            None => Client::new(sdk_config),
        };

        let queue_url = queue_url.into();
        let fifo = queue_url.ends_with(".fifo");
        info!(queue_url = %queue_url, fifo, "Connected to SQS dispatch queue");

        Self {
            client,
            queue_url,
            fifo,
        }
    }
}

fn string_attr(value: &str) -> Result<MessageAttributeValue> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| QueueError::Send(format!("Failed to build attribute: {}", e)))
}

#[async_trait]
impl DispatchQueue for SqsDispatchQueue {
    async fn send(&self, message: &DispatchMessage) -> Result<()> {
        let body = message.body_json()?;

        let mut attrs = HashMap::new();
        attrs.insert(EVENT_ID_ATTR.to_string(), string_attr(&message.event_id)?);
        attrs.insert(
            OUTCOME_ATTR.to_string(),
            string_attr(message.body.outcome())?,
        );

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .set_message_attributes(Some(attrs));

        if self.fifo {
            request = request
                .message_group_id(&message.partition_key)
                .message_deduplication_id(&message.event_id);
        }

        let output = request
            .send()
            .await
            .map_err(|e| QueueError::Send(format!("SQS send_message failed: {}", e)))?;

        debug!(
            event_id = %message.event_id,
            message_id = ?output.message_id,
            outcome = message.body.outcome(),
            "Dispatched to SQS"
        );
        Ok(())
    }
}
