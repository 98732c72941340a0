//! Stream driver for the pipe.
//!
//! One task per lineage reads batches and hands them to the `Pipe`
//! strictly in order. A lineage never moves past a batch until that batch
//! succeeded or was dead-lettered, so a failing batch is redelivered
//! exactly as read.
//!
//! A lineage split from a parent is started only once the parent's task
//! has drained it, and reads from its oldest record.
//!
//! A cursor the transport stops honoring is reopened just past the last
//! record handled, so a long redelivery never strands a lineage.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Pipe, SOURCE_COMPONENT};
use crate::dlq::DeadLetter;
use crate::model::ChangeEvent;
use crate::stream::{ChangeStream, StartingPosition, StreamCursor, StreamError};
use crate::utils::retry::RetryConfig;

/// Runner tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Where lineages found at startup begin reading.
    pub starting_position: StartingPosition,
    /// Maximum records per batch.
    pub batch_size: usize,
    /// Wait after an empty read.
    pub poll_interval: Duration,
    /// Wait between lineage discovery rounds.
    pub discovery_interval: Duration,
    /// Redelivery policy for hard-failed batches.
    pub batch_retry: RetryConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            starting_position: StartingPosition::Latest,
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            discovery_interval: Duration::from_secs(10),
            batch_retry: RetryConfig::for_batches(),
        }
    }
}

/// Where a lineage's cursor is (re)opened.
#[derive(Debug, Clone)]
enum ResumePoint {
    Position(StartingPosition),
    After(String),
}

/// Drives a change stream through a pipe until shutdown.
pub struct PipeRunner {
    stream: Arc<dyn ChangeStream>,
    pipe: Arc<Pipe>,
    config: RunnerConfig,
}

impl PipeRunner {
    pub fn new(stream: Arc<dyn ChangeStream>, pipe: Arc<Pipe>, config: RunnerConfig) -> Self {
        Self {
            stream,
            pipe,
            config,
        }
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Waits for every lineage task to stop before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut active: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut finished: HashSet<String> = HashSet::new();
        let mut first_round = true;

        info!(
            position = ?self.config.starting_position,
            batch_size = self.config.batch_size,
            "Pipe runner started"
        );

        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            active.retain(|id, handle| {
                if handle.is_finished() {
                    finished.insert(id.clone());
                    false
                } else {
                    true
                }
            });

            match self.stream.lineages().await {
                Ok(lineages) => {
                    // At LATEST a closed parent has nothing left to read, so
                    // children need not wait for it on the first round.
                    let respect_parents = !(first_round
                        && self.config.starting_position == StartingPosition::Latest);
                    let position = if first_round {
                        self.config.starting_position
                    } else {
                        StartingPosition::TrimHorizon
                    };

                    let listed: HashSet<String> = lineages.iter().map(|l| l.id.clone()).collect();

                    for lineage in lineages {
                        if active.contains_key(&lineage.id) || finished.contains(&lineage.id) {
                            continue;
                        }
                        if respect_parents {
                            if let Some(parent) = &lineage.parent {
                                let parent_pending = active.contains_key(parent)
                                    || (listed.contains(parent) && !finished.contains(parent));
                                if parent_pending {
                                    debug!(lineage = %lineage.id, parent = %parent, "Waiting for parent lineage");
                                    continue;
                                }
                            }
                        }

                        info!(lineage = %lineage.id, ?position, "Starting lineage");
                        let runner = Arc::clone(&self);
                        let handle = tokio::spawn(runner.run_lineage(
                            lineage.id.clone(),
                            position,
                            shutdown.clone(),
                        ));
                        active.insert(lineage.id, handle);
                    }
                    first_round = false;
                }
                Err(e) => warn!(error = %e, "Lineage discovery failed"),
            }

            if sleep_or_shutdown(&mut shutdown, self.config.discovery_interval).await {
                break;
            }
        }

        for (lineage, handle) in active {
            if let Err(e) = handle.await {
                error!(lineage = %lineage, error = %e, "Lineage task panicked");
            }
        }
        info!("Pipe runner stopped");
    }

    async fn run_lineage(
        self: Arc<Self>,
        lineage: String,
        position: StartingPosition,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let start = ResumePoint::Position(position);
        let Some(mut cursor) = self.open(&lineage, &start, &mut shutdown).await else {
            return;
        };
        // Sequence number of the last record delivered or dead-lettered.
        let mut last_sequence: Option<String> = None;

        loop {
            if shutdown_requested(&mut shutdown) {
                return;
            }

            let batch = match self.stream.read(&cursor, self.config.batch_size).await {
                Ok(batch) => batch,
                Err(StreamError::InvalidCursor { reason, .. }) => {
                    let resume = match &last_sequence {
                        Some(sequence) => ResumePoint::After(sequence.clone()),
                        None => start.clone(),
                    };
                    warn!(lineage = %lineage, reason = %reason, ?resume, "Cursor no longer valid, reopening");
                    match self.open(&lineage, &resume, &mut shutdown).await {
                        Some(reopened) => cursor = reopened,
                        None => return,
                    }
                    continue;
                }
                Err(e) => {
                    warn!(lineage = %lineage, error = %e, "Stream read failed");
                    if sleep_or_shutdown(&mut shutdown, self.config.poll_interval).await {
                        return;
                    }
                    continue;
                }
            };

            if let Some(last) = batch.records.last() {
                if !self.deliver(&lineage, &batch.records, &mut shutdown).await {
                    return;
                }
                last_sequence = Some(last.dynamodb.sequence_number.clone());
            }
            let empty = batch.records.is_empty();

            match batch.next {
                Some(next) => cursor = next,
                None => {
                    info!(lineage = %lineage, "Lineage closed");
                    return;
                }
            }

            if empty && sleep_or_shutdown(&mut shutdown, self.config.poll_interval).await {
                return;
            }
        }
    }

    /// Open a cursor, retrying until it works or shutdown.
    async fn open(
        &self,
        lineage: &str,
        from: &ResumePoint,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<StreamCursor> {
        let mut attempt = 0u32;
        loop {
            let opened = match from {
                ResumePoint::Position(position) => self.stream.open(lineage, *position).await,
                ResumePoint::After(sequence) => self.stream.open_after(lineage, sequence).await,
            };
            match opened {
                Ok(cursor) => return Some(cursor),
                Err(e) => {
                    let delay = self.config.batch_retry.delay_for_attempt(attempt);
                    warn!(lineage = %lineage, error = %e, delay = ?delay, "Failed to open lineage, retrying");
                    attempt = attempt.saturating_add(1);
                    if sleep_or_shutdown(shutdown, delay).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Deliver one batch until it succeeds or is dead-lettered.
    ///
    /// Returns `false` if shutdown interrupted a retry; the batch then
    /// counts as not delivered.
    async fn deliver(
        &self,
        lineage: &str,
        records: &[ChangeEvent],
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let retry = &self.config.batch_retry;
        let mut attempt = 0u32;

        loop {
            let error = match self.pipe.process_batch(records).await {
                Ok(report) => {
                    debug!(lineage = %lineage, ?report, "Batch delivered");
                    return true;
                }
                Err(e) => e,
            };

            if !retry.should_retry(attempt) {
                error!(
                    lineage = %lineage,
                    attempts = attempt + 1,
                    error = %error,
                    "Batch retries exhausted, dead-lettering"
                );
                let mut dead_letter = DeadLetter::from_batch_failure(
                    lineage,
                    records,
                    &error.to_string(),
                    attempt + 1,
                    SOURCE_COMPONENT,
                );
                if let (Some(first), Some(last)) = (records.first(), records.last()) {
                    dead_letter = dead_letter
                        .with_metadata("first_sequence", &first.dynamodb.sequence_number)
                        .with_metadata("last_sequence", &last.dynamodb.sequence_number);
                }
                if let Err(e) = self.pipe.dead_letters().publish(dead_letter).await {
                    error!(lineage = %lineage, error = %e, "Failed to publish dead letter");
                }
                return true;
            }

            let delay = retry.delay_for_attempt(attempt);
            warn!(
                lineage = %lineage,
                attempt = attempt + 1,
                error = %error,
                delay = ?delay,
                "Batch failed, redelivering"
            );
            attempt = attempt.saturating_add(1);
            if sleep_or_shutdown(shutdown, delay).await {
                return false;
            }
        }
    }
}

fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) -> bool {
    let stop = *shutdown.borrow_and_update();
    stop || shutdown.has_changed().is_err()
}

/// Sleep, waking early on shutdown. Returns `true` if shutting down.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if shutdown_requested(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => {
            changed.is_err() || *shutdown.borrow_and_update()
        }
    }
}
