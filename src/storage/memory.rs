//! In-memory store and directory for standalone mode and testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AppointmentStore, ContactDirectory, ContactPreference, Result, StorageError};
use crate::model::{AppointmentRecord, AttributeMap, EventName};
use crate::stream::MemoryChangeStream;

/// Appointment table that emits a change event for every mutation.
pub struct InMemoryAppointmentStore {
    items: RwLock<HashMap<String, AttributeMap>>,
    stream: Arc<MemoryChangeStream>,
    fail_on_put: RwLock<bool>,
}

impl InMemoryAppointmentStore {
    pub fn new(stream: Arc<MemoryChangeStream>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            stream,
            fail_on_put: RwLock::new(false),
        }
    }

    pub fn stream(&self) -> Arc<MemoryChangeStream> {
        Arc::clone(&self.stream)
    }

    pub async fn set_fail_on_put(&self, fail: bool) {
        *self.fail_on_put.write().await = fail;
    }

    pub async fn get(&self, id: &str) -> Option<AttributeMap> {
        self.items.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Delete an item, emitting a `REMOVE` event if it existed.
    pub async fn delete(&self, id: &str) -> bool {
        let mut items = self.items.write().await;
        if items.remove(id).is_some() {
            self.stream.append(EventName::Remove, id, None).await;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn put(&self, record: &AppointmentRecord) -> Result<()> {
        if *self.fail_on_put.read().await {
            return Err(StorageError::Write("Mock put failure".to_string()));
        }

        let image = record.to_image();
        // Holding the write lock while appending keeps table and stream order aligned.
        let mut items = self.items.write().await;
        let name = if items.insert(record.id.clone(), image.clone()).is_some() {
            EventName::Modify
        } else {
            EventName::Insert
        };
        self.stream.append(name, &record.id, Some(image)).await;
        Ok(())
    }
}

/// Contact directory backed by a map, with failure injection for tests.
#[derive(Default)]
pub struct InMemoryContactDirectory {
    entries: RwLock<HashMap<String, ContactPreference>>,
    fail_on_get: RwLock<bool>,
    lookup_delay: RwLock<Option<Duration>>,
    lookups: AtomicUsize,
}

impl InMemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, email: &str, preferred_method: &str) {
        self.entries
            .write()
            .await
            .insert(email.to_string(), ContactPreference::new(email, preferred_method));
    }

    /// Add an entry that exists but has no `preferredMethod`.
    pub async fn insert_without_method(&self, email: &str) {
        self.entries
            .write()
            .await
            .insert(email.to_string(), ContactPreference::without_method(email));
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    /// Delay every lookup, to exercise caller timeouts.
    pub async fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.write().await = delay;
    }

    /// Number of lookups attempted, including failed ones.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContactDirectory for InMemoryContactDirectory {
    async fn get(&self, email: &str) -> Result<Option<ContactPreference>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let delay = *self.lookup_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_on_get.read().await {
            return Err(StorageError::Connection(
                "Mock directory unavailable".to_string(),
            ));
        }
        Ok(self.entries.read().await.get(email).cloned())
    }
}
