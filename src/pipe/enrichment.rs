//! Enrichment of inserted appointments with contact preferences.
//!
//! Bad record data never fails a batch: it turns into a `SoftFailRecord`
//! carrying whatever part of the record could be decoded. Only directory
//! outages (errors and timeouts) surface as `EnrichmentError`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;
use tracing::{debug, warn};

use crate::model::{
    image_to_json_partial, patient_email, EnrichedRecord, EnrichmentOutput, InsertEvent,
    SoftFailRecord,
};
use crate::storage::{ContactDirectory, StorageError};

/// Default bound on a single directory lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Hard failures: the whole batch must be retried.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("Contact directory lookup failed: {0}")]
    Directory(#[from] StorageError),

    #[error("Contact directory lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns a batch of inserts into one output per input, in order.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich_batch(
        &self,
        events: &[InsertEvent],
    ) -> Result<Vec<EnrichmentOutput>, EnrichmentError>;
}

/// Enricher backed by the contact directory.
pub struct ContactEnricher {
    directory: Arc<dyn ContactDirectory>,
    lookup_timeout: Duration,
}

impl ContactEnricher {
    pub fn new(directory: Arc<dyn ContactDirectory>) -> Self {
        Self {
            directory,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Enrich a single insert.
    pub async fn enrich(&self, event: &InsertEvent) -> Result<EnrichmentOutput, EnrichmentError> {
        let Some(image) = event.new_image() else {
            warn!(event_id = %event.event_id(), "Insert event carries no new image");
            return Ok(SoftFailRecord::new("Missing NewImage", Map::new()).into());
        };

        let (body, decode_error) = image_to_json_partial(image);
        if let Some(e) = decode_error {
            warn!(event_id = %event.event_id(), error = %e, "Undecodable appointment image");
            return Ok(SoftFailRecord::new(e, body).into());
        }

        let email = match patient_email(&body) {
            Ok(email) => email.to_string(),
            Err(e) => {
                warn!(event_id = %event.event_id(), error = %e, "Appointment has no usable patient email");
                return Ok(SoftFailRecord::new(e, body).into());
            }
        };

        let lookup = tokio::time::timeout(self.lookup_timeout, self.directory.get(&email))
            .await
            .map_err(|_| EnrichmentError::Timeout(self.lookup_timeout))??;

        let output: EnrichmentOutput = match lookup {
            Some(entry) => match entry.preferred_method {
                Some(method) => EnrichedRecord::new(body, method).into(),
                None => SoftFailRecord::new(
                    format!("Contact entry for '{}' has no preferredMethod", email),
                    body,
                )
                .into(),
            },
            None => EnrichedRecord::without_preference(body).into(),
        };

        debug!(
            event_id = %event.event_id(),
            outcome = output.outcome(),
            "Enriched appointment"
        );
        Ok(output)
    }
}

#[async_trait]
impl Enricher for ContactEnricher {
    #[tracing::instrument(name = "pipe.enrich", skip_all, fields(count = events.len()))]
    async fn enrich_batch(
        &self,
        events: &[InsertEvent],
    ) -> Result<Vec<EnrichmentOutput>, EnrichmentError> {
        let mut outputs = Vec::with_capacity(events.len());
        for event in events {
            outputs.push(self.enrich(event).await?);
        }
        Ok(outputs)
    }
}
