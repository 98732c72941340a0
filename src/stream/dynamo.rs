//! DynamoDB Streams implementation of ChangeStream.
//!
//! Shards map onto lineages. A shard's parent is recorded so the runner
//! can drain the parent before starting on its children. Shard iterators
//! serve as cursor tokens.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodbstreams::operation::get_records::GetRecordsError;
use aws_sdk_dynamodbstreams::types::{
    AttributeValue as SdkValue, Record, ShardIteratorType,
};
use aws_sdk_dynamodbstreams::Client;
use base64::prelude::*;
use tracing::{debug, info};

use super::{ChangeStream, Lineage, Result, StartingPosition, StreamBatch, StreamCursor, StreamError};
use crate::model::{AttributeMap, AttributeValue, ChangeEvent, StreamRecord};

/// Change stream over a DynamoDB table stream.
pub struct DynamoChangeStream {
    client: Client,
    stream_arn: String,
}

impl DynamoChangeStream {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        stream_arn: impl Into<String>,
        endpoint_url: Option<&str>,
    ) -> Self {
        let client = match endpoint_url {
            Some(endpoint) => {
                let config = aws_sdk_dynamodbstreams::config::Builder::from(sdk_config)
                    .endpoint_url(endpoint)
                    .build();
                Client::from_conf(config)
            }
            None => Client::new(sdk_config),
        };

        let stream_arn = stream_arn.into();
        info!(stream_arn = %stream_arn, "Connected to DynamoDB Streams");
        Self { client, stream_arn }
    }
}

#[async_trait]
impl ChangeStream for DynamoChangeStream {
    async fn lineages(&self) -> Result<Vec<Lineage>> {
        let mut lineages = Vec::new();
        let mut start_after: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_stream()
                .stream_arn(&self.stream_arn)
                .set_exclusive_start_shard_id(start_after.take())
                .send()
                .await
                .map_err(|e| {
                    StreamError::Connection(format!("DynamoDB Streams describe_stream failed: {}", e))
                })?;

            let Some(description) = output.stream_description else {
                break;
            };

            for shard in description.shards.unwrap_or_default() {
                let Some(id) = shard.shard_id else {
                    continue;
                };
                let lineage = match shard.parent_shard_id {
                    Some(parent) => Lineage::new(id).with_parent(parent),
                    None => Lineage::new(id),
                };
                lineages.push(lineage);
            }

            match description.last_evaluated_shard_id {
                Some(last) => start_after = Some(last),
                None => break,
            }
        }

        debug!(stream_arn = %self.stream_arn, count = lineages.len(), "Described stream shards");
        Ok(lineages)
    }

    async fn open(&self, lineage: &str, position: StartingPosition) -> Result<StreamCursor> {
        let iterator_type = match position {
            StartingPosition::Latest => ShardIteratorType::Latest,
            StartingPosition::TrimHorizon => ShardIteratorType::TrimHorizon,
        };

        self.shard_iterator(lineage, iterator_type, None).await
    }

    async fn open_after(&self, lineage: &str, sequence_number: &str) -> Result<StreamCursor> {
        debug!(shard = %lineage, sequence_number = %sequence_number, "Resuming shard after sequence");
        self.shard_iterator(
            lineage,
            ShardIteratorType::AfterSequenceNumber,
            Some(sequence_number),
        )
        .await
    }

    async fn read(&self, cursor: &StreamCursor, limit: usize) -> Result<StreamBatch> {
        let limit = i32::try_from(limit.clamp(1, 1000)).unwrap_or(1000);

        let output = self
            .client
            .get_records()
            .shard_iterator(&cursor.token)
            .limit(limit)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(
                    GetRecordsError::ExpiredIteratorException(_)
                    | GetRecordsError::TrimmedDataAccessException(_),
                ) => StreamError::InvalidCursor {
                    lineage: cursor.lineage.clone(),
                    reason: format!("shard iterator no longer valid: {}", e),
                },
                _ => StreamError::Read(format!("DynamoDB Streams get_records failed: {}", e)),
            })?;

        let records = output
            .records
            .unwrap_or_default()
            .into_iter()
            .map(to_change_event)
            .collect::<Result<Vec<_>>>()?;

        let next = output.next_shard_iterator.map(|token| StreamCursor {
            lineage: cursor.lineage.clone(),
            token,
        });

        Ok(StreamBatch { records, next })
    }
}

impl DynamoChangeStream {
    async fn shard_iterator(
        &self,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
    ) -> Result<StreamCursor> {
        let output = self
            .client
            .get_shard_iterator()
            .stream_arn(&self.stream_arn)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type)
            .set_sequence_number(sequence_number.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                StreamError::Connection(format!("DynamoDB Streams get_shard_iterator failed: {}", e))
            })?;

        let token = output
            .shard_iterator
            .ok_or_else(|| StreamError::UnknownLineage(shard_id.to_string()))?;

        Ok(StreamCursor {
            lineage: shard_id.to_string(),
            token,
        })
    }
}

fn to_change_event(record: Record) -> Result<ChangeEvent> {
    let event_name = record
        .event_name
        .map(|name| name.as_str().to_string())
        .unwrap_or_default();
    let (keys, new_image, sequence_number) = match record.dynamodb {
        Some(r) => (r.keys, r.new_image, r.sequence_number),
        None => (None, None, None),
    };

    Ok(ChangeEvent {
        event_id: record.event_id.unwrap_or_default(),
        event_name,
        event_source_arn: record.event_source_arn,
        dynamodb: StreamRecord {
            keys: from_sdk_map(keys.unwrap_or_default())?,
            new_image: new_image.map(from_sdk_map).transpose()?,
            sequence_number: sequence_number.unwrap_or_default(),
        },
    })
}

fn from_sdk_map(map: HashMap<String, SdkValue>) -> Result<AttributeMap> {
    map.into_iter()
        .map(|(name, value)| Ok((name, from_sdk(value)?)))
        .collect()
}

fn from_sdk(value: SdkValue) -> Result<AttributeValue> {
    Ok(match value {
        SdkValue::S(s) => AttributeValue::S(s),
        SdkValue::N(n) => AttributeValue::N(n),
        SdkValue::B(b) => AttributeValue::binary(b.as_ref()),
        SdkValue::Bool(b) => AttributeValue::Bool(b),
        SdkValue::Null(n) => AttributeValue::Null(n),
        SdkValue::M(m) => AttributeValue::M(from_sdk_map(m)?),
        SdkValue::L(items) => {
            AttributeValue::L(items.into_iter().map(from_sdk).collect::<Result<_>>()?)
        }
        SdkValue::Ss(items) => AttributeValue::Ss(items),
        SdkValue::Ns(items) => AttributeValue::Ns(items),
        SdkValue::Bs(items) => AttributeValue::Bs(
            items
                .iter()
                .map(|b| BASE64_STANDARD.encode(b.as_ref()))
                .collect(),
        ),
        other => {
            return Err(StreamError::Read(format!(
                "unsupported attribute type in stream image: {:?}",
                other
            )))
        }
    })
}
