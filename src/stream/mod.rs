//! Change-stream transport.
//!
//! This module contains:
//! - `ChangeStream` trait: lineage discovery and cursor-based reads
//! - `MemoryChangeStream`: in-process stream fed by the in-memory store
//! - `DynamoChangeStream`: DynamoDB Streams (feature `dynamo`)
//!
//! A stream is split into lineages (shards). Ordering is guaranteed within
//! a lineage only. Position tracking lives entirely in `StreamCursor`
//! values handed back by the transport; readers hold no other state.

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::ChangeEvent;

pub mod memory;

#[cfg(feature = "dynamo")]
pub mod dynamo;

pub use memory::MemoryChangeStream;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoChangeStream;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur reading the change stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unknown lineage: {0}")]
    UnknownLineage(String),

    #[error("Invalid cursor for lineage '{lineage}': {reason}")]
    InvalidCursor { lineage: String, reason: String },

    #[error("Read failed: {0}")]
    Read(String),
}

/// Where to start reading a freshly opened lineage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingPosition {
    /// Only events written after the cursor is opened.
    #[default]
    Latest,
    /// Oldest retained event.
    TrimHorizon,
}

/// One ordered partition of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub id: String,
    /// Lineage this one was split from; its events come first.
    pub parent: Option<String>,
}

impl Lineage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Opaque read position within a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    pub lineage: String,
    pub token: String,
}

/// Records returned by one read.
#[derive(Debug, Clone, Default)]
pub struct StreamBatch {
    /// Events in lineage order. May be empty when nothing new arrived.
    pub records: Vec<ChangeEvent>,
    /// Cursor for the following read; `None` once the lineage is closed.
    pub next: Option<StreamCursor>,
}

/// Interface for reading an ordered, at-least-once change stream.
///
/// Implementations:
/// - `MemoryChangeStream`: in-memory, used by standalone mode and tests
/// - `DynamoChangeStream`: DynamoDB Streams
#[async_trait]
pub trait ChangeStream: Send + Sync {
    /// List the lineages currently available.
    async fn lineages(&self) -> Result<Vec<Lineage>>;

    /// Open a cursor on a lineage.
    async fn open(&self, lineage: &str, position: StartingPosition) -> Result<StreamCursor>;

    /// Open a cursor just past the record with `sequence_number`.
    ///
    /// Used to resume after a cursor went stale.
    async fn open_after(&self, lineage: &str, sequence_number: &str) -> Result<StreamCursor>;

    /// Read up to `limit` records from the cursor.
    ///
    /// Reading the same cursor again yields the same records. A cursor the
    /// transport no longer honors (expired, trimmed) fails with
    /// `StreamError::InvalidCursor`; callers reopen with `open_after`.
    async fn read(&self, cursor: &StreamCursor, limit: usize) -> Result<StreamBatch>;
}
