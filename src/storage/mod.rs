//! Storage interfaces and implementations.
//!
//! This module contains:
//! - `AppointmentStore` trait: single-shot writes of new appointments
//! - `ContactDirectory` trait: read-only point lookups by patient email
//! - In-memory implementations for standalone mode and tests
//! - DynamoDB implementations (feature `dynamo`)

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::{AppointmentRecord, AttributeError, AttributeMap, KEY_ATTRIBUTE, PREFERRED_METHOD_FIELD};

pub mod memory;

#[cfg(feature = "dynamo")]
pub mod dynamo;

pub use memory::{InMemoryAppointmentStore, InMemoryContactDirectory};

#[cfg(feature = "dynamo")]
pub use dynamo::{DynamoAppointmentStore, DynamoContactDirectory};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// Interface for appointment persistence.
///
/// Every successful `put` is observed by the change stream.
///
/// Implementations:
/// - `InMemoryAppointmentStore`: in-memory, feeds a `MemoryChangeStream`
/// - `DynamoAppointmentStore`: DynamoDB table with streams enabled
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Write a record. Single attempt; no retry.
    async fn put(&self, record: &AppointmentRecord) -> Result<()>;
}

/// A patient's contact preference entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPreference {
    pub email: String,
    /// `None` when the entry exists but carries no usable method.
    pub preferred_method: Option<String>,
}

impl ContactPreference {
    pub fn new(email: impl Into<String>, preferred_method: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            preferred_method: Some(preferred_method.into()),
        }
    }

    /// An entry that exists but names no usable method.
    pub fn without_method(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            preferred_method: None,
        }
    }

    /// Decode the directory item found under `email`.
    ///
    /// A malformed item is still an entry: without a string
    /// `preferredMethod` it decodes with no method.
    pub fn from_item(email: &str, item: &AttributeMap) -> Self {
        match item.get(KEY_ATTRIBUTE).and_then(|v| v.as_str()) {
            Some(id) if id == email => {}
            Some(id) => warn!(email = %email, id = %id, "Contact item id differs from lookup key"),
            None => warn!(email = %email, "Contact item has no string id"),
        }

        let preferred_method = match item.get(PREFERRED_METHOD_FIELD) {
            Some(value) => match value.as_str() {
                Some(method) => Some(method.to_string()),
                None => {
                    debug!(email = %email, "preferredMethod is not a string attribute");
                    None
                }
            },
            None => None,
        };

        Self {
            email: email.to_string(),
            preferred_method,
        }
    }
}

/// Interface for contact preference lookups.
///
/// Read-only and safe for arbitrarily many concurrent readers.
///
/// Implementations:
/// - `InMemoryContactDirectory`: in-memory map
/// - `DynamoContactDirectory`: DynamoDB table keyed by email
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Point lookup by email. `Ok(None)` means no entry.
    async fn get(&self, email: &str) -> Result<Option<ContactPreference>>;
}
