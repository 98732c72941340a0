//! Table, stream, queue and pipe configuration types.

use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::pipe::RunnerConfig;
use crate::stream::StartingPosition;
use crate::utils::retry::{BatchRetrySettings, RetryConfig, RetrySettings};

/// Insert-only filter, in pattern form.
pub const DEFAULT_FILTER_PATTERN: &str = r#"{"eventName":[{"prefix":"INSERT"}]}"#;

/// A key-value table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub table_name: String,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

/// Change stream configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// DynamoDB stream ARN of the appointments table.
    pub stream_arn: Option<String>,
    /// Where to start on lineages found at startup.
    pub starting_position: StartingPosition,
    /// Number of lineages for the in-memory stream.
    pub lineage_count: usize,
    /// Maximum records per batch.
    pub batch_size: usize,
    /// Wait after an empty read.
    pub poll_interval_ms: u64,
    /// Wait between lineage discovery rounds.
    pub discovery_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_arn: None,
            starting_position: StartingPosition::Latest,
            lineage_count: 4,
            batch_size: 100,
            poll_interval_ms: 500,
            discovery_interval_ms: 10_000,
        }
    }
}

impl StreamConfig {
    pub fn require_stream_arn(&self) -> Result<&str, ConfigError> {
        self.stream_arn
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("stream.stream_arn is required".to_string()))
    }
}

/// Dispatch queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// SQS queue URL.
    pub queue_url: Option<String>,
    /// Logical queue name, used in logs.
    pub queue_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            queue_name: "AppointmentsQueue".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn require_queue_url(&self) -> Result<&str, ConfigError> {
        self.queue_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("queue.queue_url is required".to_string()))
    }
}

/// Filter, timeout and retry settings for the pipe.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Bound on a single directory lookup. Exceeding it fails the batch.
    pub lookup_timeout_ms: u64,
    /// Bound on a single enqueue call.
    pub enqueue_timeout_ms: u64,
    /// JSON filter patterns; any match passes.
    pub filter_patterns: Vec<String>,
    /// Per-message enqueue retry.
    pub dispatch_retry: RetrySettings,
    /// Per-batch redelivery retry after a hard failure.
    pub batch_retry: BatchRetrySettings,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2_000,
            enqueue_timeout_ms: 2_000,
            filter_patterns: vec![DEFAULT_FILTER_PATTERN.to_string()],
            dispatch_retry: RetrySettings::from(&RetryConfig::for_dispatch()),
            batch_retry: BatchRetrySettings::default(),
        }
    }
}

impl PipeConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn dispatch_retry(&self) -> RetryConfig {
        RetryConfig::from(&self.dispatch_retry)
    }

    /// Runner settings from the stream and pipe sections.
    pub fn runner_config(&self, stream: &StreamConfig) -> RunnerConfig {
        RunnerConfig {
            starting_position: stream.starting_position,
            batch_size: stream.batch_size,
            poll_interval: Duration::from_millis(stream.poll_interval_ms),
            discovery_interval: Duration::from_millis(stream.discovery_interval_ms),
            batch_retry: RetryConfig::from(&self.batch_retry),
        }
    }
}
