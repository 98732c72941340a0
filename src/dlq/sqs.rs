//! SQS dead letter publisher.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client;
use tracing::{error, info};

use super::{DeadLetter, DeadLetterPublisher, DlqError};

/// Attribute carrying the component that gave up.
pub const SOURCE_ATTR: &str = "sourceComponent";

/// Publishes dead letters as JSON messages to an SQS queue.
pub struct SqsDeadLetterPublisher {
    client: Client,
    queue_url: String,
}

impl SqsDeadLetterPublisher {
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
        info!(queue_url = %queue_url, "SQS DLQ publisher ready");
        Self { client, queue_url }
    }
}

#[async_trait]
impl DeadLetterPublisher for SqsDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        let body = dead_letter.to_json()?;

        let mut attrs = HashMap::new();
        attrs.insert(
            SOURCE_ATTR.to_string(),
            MessageAttributeValue::builder()
                .data_type("String")
                .string_value(&dead_letter.source_component)
                .build()
                .map_err(|e| DlqError::PublishFailed(format!("Failed to build attribute: {}", e)))?,
        );

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .set_message_attributes(Some(attrs))
            .send()
            .await
            .map_err(|e| {
                error!(queue_url = %self.queue_url, error = %e, "Failed to publish dead letter");
                DlqError::PublishFailed(format!("SQS send_message failed: {}", e))
            })?;

        info!(
            queue_url = %self.queue_url,
            reason = %dead_letter.rejection_reason,
            "Published dead letter to SQS"
        );
        Ok(())
    }
}
