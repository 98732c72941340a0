//! In-memory change stream.
//!
//! Keeps an append-only log per lineage. Records are routed to a lineage by
//! a stable hash of their partition key, so every change to one key lands
//! in the same ordered log.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    ChangeStream, Lineage, Result, StartingPosition, StreamBatch, StreamCursor, StreamError,
};
use crate::model::{AttributeMap, ChangeEvent, EventName};

/// Source identifier stamped on every event.
pub const MEMORY_STREAM_ARN: &str = "memory:appointments/stream";

/// In-memory change stream with a fixed number of lineages.
pub struct MemoryChangeStream {
    lineages: Vec<RwLock<Vec<ChangeEvent>>>,
    next_sequence: AtomicU64,
    opened: AtomicUsize,
}

impl MemoryChangeStream {
    /// Create a stream with `lineage_count` lineages (at least one).
    pub fn new(lineage_count: usize) -> Self {
        let count = lineage_count.max(1);
        Self {
            lineages: (0..count).map(|_| RwLock::new(Vec::new())).collect(),
            next_sequence: AtomicU64::new(1),
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of cursors opened so far.
    pub fn opened_cursors(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Lineage id that events for `key` are appended to.
    pub fn lineage_for_key(&self, key: &str) -> String {
        lineage_id(self.index_for_key(key))
    }

    fn index_for_key(&self, key: &str) -> usize {
        // FNV-1a: stable across processes, unlike the std hasher.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.lineages.len() as u64) as usize
    }

    fn index_for_lineage(&self, lineage: &str) -> Result<usize> {
        lineage
            .strip_prefix("lineage-")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|i| *i < self.lineages.len())
            .ok_or_else(|| StreamError::UnknownLineage(lineage.to_string()))
    }

    /// Append a change for `key`, returning the emitted event.
    pub async fn append(
        &self,
        name: EventName,
        key: &str,
        new_image: Option<AttributeMap>,
    ) -> ChangeEvent {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = ChangeEvent::new(
            Uuid::new_v4().to_string(),
            name,
            key,
            new_image,
            format!("{:021}", sequence),
        )
        .with_source(MEMORY_STREAM_ARN);

        let index = self.index_for_key(key);
        self.lineages[index].write().await.push(event.clone());

        debug!(
            lineage = %lineage_id(index),
            key = %key,
            event_name = %name,
            sequence,
            "Appended change event"
        );
        event
    }

    /// Snapshot of every event in one lineage.
    pub async fn events(&self, lineage: &str) -> Result<Vec<ChangeEvent>> {
        let index = self.index_for_lineage(lineage)?;
        Ok(self.lineages[index].read().await.clone())
    }
}

impl Default for MemoryChangeStream {
    fn default() -> Self {
        Self::new(1)
    }
}

fn lineage_id(index: usize) -> String {
    format!("lineage-{:04}", index)
}

#[async_trait]
impl ChangeStream for MemoryChangeStream {
    async fn lineages(&self) -> Result<Vec<Lineage>> {
        Ok((0..self.lineages.len())
            .map(|i| Lineage::new(lineage_id(i)))
            .collect())
    }

    async fn open(&self, lineage: &str, position: StartingPosition) -> Result<StreamCursor> {
        let index = self.index_for_lineage(lineage)?;
        let offset = match position {
            StartingPosition::Latest => self.lineages[index].read().await.len(),
            StartingPosition::TrimHorizon => 0,
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(StreamCursor {
            lineage: lineage.to_string(),
            token: offset.to_string(),
        })
    }

    async fn open_after(&self, lineage: &str, sequence_number: &str) -> Result<StreamCursor> {
        let index = self.index_for_lineage(lineage)?;
        let log = self.lineages[index].read().await;
        let position = log
            .iter()
            .position(|event| event.dynamodb.sequence_number == sequence_number)
            .ok_or_else(|| StreamError::InvalidCursor {
                lineage: lineage.to_string(),
                reason: format!("no record with sequence number {}", sequence_number),
            })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(StreamCursor {
            lineage: lineage.to_string(),
            token: (position + 1).to_string(),
        })
    }

    async fn read(&self, cursor: &StreamCursor, limit: usize) -> Result<StreamBatch> {
        let index = self.index_for_lineage(&cursor.lineage)?;
        let offset: usize = cursor.token.parse().map_err(|_| StreamError::InvalidCursor {
            lineage: cursor.lineage.clone(),
            reason: format!("not an offset: {}", cursor.token),
        })?;

        let log = self.lineages[index].read().await;
        if offset > log.len() {
            return Err(StreamError::InvalidCursor {
                lineage: cursor.lineage.clone(),
                reason: format!("offset {} beyond end {}", offset, log.len()),
            });
        }

        let end = offset.saturating_add(limit.max(1)).min(log.len());
        let records = log[offset..end].to_vec();

        Ok(StreamBatch {
            records,
            next: Some(StreamCursor {
                lineage: cursor.lineage.clone(),
                token: end.to_string(),
            }),
        })
    }
}
