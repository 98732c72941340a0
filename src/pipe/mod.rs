//! Change-stream to dispatch-queue pipe.
//!
//! This module contains:
//! - `Pipe`: filter, enrich and dispatch one stream batch
//! - `PipeRunner`: drives a `ChangeStream` through a `Pipe`, one task per lineage
//! - `FilterCriteria`: which change events are worth enriching
//! - `Enricher` / `ContactEnricher`: the enrichment step
//!
//! A batch fails as a whole only when enrichment hard-fails. Dispatch
//! failures are retried per message and then dead-lettered, so one stuck
//! message never holds back its neighbours.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::dlq::{DeadLetter, DeadLetterPublisher, NoopDeadLetterPublisher};
use crate::model::{ChangeEvent, InsertEvent};
use crate::queue::{DispatchMessage, DispatchQueue, QueueError};
use crate::utils::retry::RetryConfig;

pub mod enrichment;
pub mod filter;
pub mod runner;

pub use enrichment::{ContactEnricher, Enricher, EnrichmentError};
pub use filter::{FieldRule, FilterCriteria, FilterError, FilterPattern};
pub use runner::{PipeRunner, RunnerConfig};

/// Component name stamped on dead letters.
pub const SOURCE_COMPONENT: &str = "dentists-pipe";

/// Default bound on a single enqueue call.
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Batch-level failures. The whole batch must be redelivered.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("Enrichment failed: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Enricher returned {actual} outputs for {expected} events")]
    OutputMismatch { expected: usize, actual: usize },
}

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub filtered_out: usize,
    pub enriched: usize,
    pub soft_failed: usize,
    pub dispatched: usize,
    pub dead_lettered: usize,
}

enum DispatchOutcome {
    Dispatched,
    DeadLettered,
}

/// Filter, enrich and dispatch.
pub struct Pipe {
    filter: FilterCriteria,
    enricher: Arc<dyn Enricher>,
    queue: Arc<dyn DispatchQueue>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
    dispatch_retry: RetryConfig,
    enqueue_timeout: Duration,
}

impl Pipe {
    /// Insert-only filter, noop dead letters, default dispatch retry.
    pub fn new(enricher: Arc<dyn Enricher>, queue: Arc<dyn DispatchQueue>) -> Self {
        Self {
            filter: FilterCriteria::insert_only(),
            enricher,
            queue,
            dead_letters: Arc::new(NoopDeadLetterPublisher),
            dispatch_retry: RetryConfig::for_dispatch(),
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }

    /// Replace the filter criteria.
    ///
    /// Criteria can only narrow: an event must also be an insert to reach
    /// the enricher.
    pub fn with_filter(mut self, filter: FilterCriteria) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterPublisher>) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    pub fn with_dispatch_retry(mut self, retry: RetryConfig) -> Self {
        self.dispatch_retry = retry;
        self
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    pub fn dead_letters(&self) -> Arc<dyn DeadLetterPublisher> {
        Arc::clone(&self.dead_letters)
    }

    /// Keep the events that pass the criteria and are inserts.
    pub fn filter_batch(&self, events: &[ChangeEvent]) -> Vec<InsertEvent> {
        events
            .iter()
            .filter_map(|event| {
                if !self.filter.matches(event) {
                    debug!(event_id = %event.event_id, event_name = %event.event_name, "Filtered out");
                    return None;
                }
                match InsertEvent::try_from(event.clone()) {
                    Ok(insert) => Some(insert),
                    Err(rejected) => {
                        warn!(
                            event_id = %rejected.event_id,
                            event_name = %rejected.event_name,
                            "Filter passed a non-insert event, dropping"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Process one stream batch.
    ///
    /// Returns `Err` only on a hard enrichment failure, in which case
    /// nothing from the batch was dispatched.
    #[tracing::instrument(name = "pipe.process_batch", skip_all, fields(count = events.len()))]
    pub async fn process_batch(&self, events: &[ChangeEvent]) -> Result<BatchReport, PipeError> {
        let inserts = self.filter_batch(events);
        let mut report = BatchReport {
            received: events.len(),
            filtered_out: events.len() - inserts.len(),
            ..Default::default()
        };

        if inserts.is_empty() {
            debug!(received = report.received, "Nothing to enrich");
            return Ok(report);
        }

        let outputs = self.enricher.enrich_batch(&inserts).await?;
        if outputs.len() != inserts.len() {
            return Err(PipeError::OutputMismatch {
                expected: inserts.len(),
                actual: outputs.len(),
            });
        }

        let messages: Vec<DispatchMessage> = inserts
            .iter()
            .zip(outputs)
            .map(|(insert, output)| {
                let key = insert.partition_key().unwrap_or(insert.event_id());
                DispatchMessage::new(insert.event_id(), key, output)
            })
            .collect();

        report.soft_failed = messages.iter().filter(|m| m.body.is_soft_fail()).count();
        report.enriched = messages.len() - report.soft_failed;

        for outcome in self.dispatch_all(&messages).await {
            match outcome {
                DispatchOutcome::Dispatched => report.dispatched += 1,
                DispatchOutcome::DeadLettered => report.dead_lettered += 1,
            }
        }

        info!(
            received = report.received,
            enriched = report.enriched,
            soft_failed = report.soft_failed,
            dispatched = report.dispatched,
            dead_lettered = report.dead_lettered,
            "Batch processed"
        );
        Ok(report)
    }

    /// Send every message. Messages sharing a key go out in order; distinct
    /// keys go out concurrently.
    async fn dispatch_all(&self, messages: &[DispatchMessage]) -> Vec<DispatchOutcome> {
        let mut groups: Vec<Vec<&DispatchMessage>> = Vec::new();
        let mut group_index: HashMap<&str, usize> = HashMap::new();
        for message in messages {
            let index = *group_index
                .entry(message.partition_key.as_str())
                .or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
            groups[index].push(message);
        }

        let results = join_all(groups.into_iter().map(|group| async move {
            let mut outcomes = Vec::with_capacity(group.len());
            for message in group {
                outcomes.push(self.dispatch(message).await);
            }
            outcomes
        }))
        .await;

        results.into_iter().flatten().collect()
    }

    async fn dispatch(&self, message: &DispatchMessage) -> DispatchOutcome {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let queue = &self.queue;
        let timeout = self.enqueue_timeout;

        let result = (|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            match tokio::time::timeout(timeout, queue.send(message)).await {
                Ok(sent) => sent,
                Err(_) => Err(QueueError::Timeout(timeout)),
            }
        })
        .retry(self.dispatch_retry.backoff())
        .when(|e: &QueueError| !matches!(e, QueueError::Serialization(_)))
        .notify(|err: &QueueError, dur: Duration| {
            warn!(event_id = %message.event_id, error = %err, delay = ?dur, "Enqueue failed, retrying");
        })
        .await;

        match result {
            Ok(()) => DispatchOutcome::Dispatched,
            Err(e) => {
                let attempts = attempts.load(Ordering::SeqCst);
                error!(
                    event_id = %message.event_id,
                    attempts,
                    error = %e,
                    "Enqueue retries exhausted, dead-lettering"
                );
                let dead_letter = DeadLetter::from_dispatch_failure(
                    message,
                    &e.to_string(),
                    attempts,
                    SOURCE_COMPONENT,
                );
                if let Err(dlq_err) = self.dead_letters.publish(dead_letter).await {
                    error!(event_id = %message.event_id, error = %dlq_err, "Failed to publish dead letter");
                }
                DispatchOutcome::DeadLettered
            }
        }
    }
}
