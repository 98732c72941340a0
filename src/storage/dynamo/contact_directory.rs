//! DynamoDB ContactDirectory implementation.
//!
//! Table schema:
//! - PK: `id` (String, patient email)
//! - preferredMethod: contact channel (String)

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use super::convert::from_sdk;
use crate::model::{AttributeMap, KEY_ATTRIBUTE};
use crate::storage::{ContactDirectory, ContactPreference, Result, StorageError};

/// DynamoDB implementation of ContactDirectory.
pub struct DynamoContactDirectory {
    client: Client,
    table_name: String,
}

impl DynamoContactDirectory {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        table_name: impl Into<String>,
        endpoint_url: Option<&str>,
    ) -> Self {
        let table_name = table_name.into();
        info!(table = %table_name, "Connected to DynamoDB for contacts");
        Self {
            client: super::client(sdk_config, endpoint_url),
            table_name,
        }
    }
}

#[async_trait]
impl ContactDirectory for DynamoContactDirectory {
    async fn get(&self, email: &str) -> Result<Option<ContactPreference>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(email.to_string()))
            .send()
            .await
            .map_err(|e| StorageError::Read(format!("DynamoDB get_item failed: {}", e)))?;

        match result.item {
            Some(item) => {
                let preference = preference_from_sdk_item(email, &item);
                debug!(email = %email, method = ?preference.preferred_method, "Found contact preference");
                Ok(Some(preference))
            }
            None => {
                debug!(email = %email, "No contact preference");
                Ok(None)
            }
        }
    }
}

/// Decode a directory item, dropping attributes the crate cannot represent.
fn preference_from_sdk_item(
    email: &str,
    item: &HashMap<String, AttributeValue>,
) -> ContactPreference {
    let decoded: AttributeMap = item
        .iter()
        .filter_map(|(name, value)| match from_sdk(value) {
            Ok(value) => Some((name.clone(), value)),
            Err(e) => {
                warn!(email = %email, attribute = %name, error = %e, "Dropping undecodable contact attribute");
                None
            }
        })
        .collect();
    ContactPreference::from_item(email, &decoded)
}
