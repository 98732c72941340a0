//! DynamoDB AppointmentStore implementation.
//!
//! Table schema:
//! - PK: `id` (String, server-generated UUID)
//! - remaining attributes: the request body, stored as-is
//!
//! The table must have streams enabled with the `NEW_IMAGE` view.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use super::convert::to_sdk_item;
use crate::model::AppointmentRecord;
use crate::storage::{AppointmentStore, Result, StorageError};

/// DynamoDB implementation of AppointmentStore.
pub struct DynamoAppointmentStore {
    client: Client,
    table_name: String,
}

impl DynamoAppointmentStore {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        table_name: impl Into<String>,
        endpoint_url: Option<&str>,
    ) -> Self {
        let table_name = table_name.into();
        info!(table = %table_name, "Connected to DynamoDB for appointments");
        Self {
            client: super::client(sdk_config, endpoint_url),
            table_name,
        }
    }
}

#[async_trait]
impl AppointmentStore for DynamoAppointmentStore {
    async fn put(&self, record: &AppointmentRecord) -> Result<()> {
        let item = to_sdk_item(&record.to_image())?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StorageError::Write(format!("DynamoDB put_item failed: {}", e)))?;

        debug!(table = %self.table_name, id = %record.id, "Stored appointment in DynamoDB");
        Ok(())
    }
}
