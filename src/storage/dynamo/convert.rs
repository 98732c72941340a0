//! Conversion between the crate's attribute model and the DynamoDB SDK's.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as SdkValue;
use base64::prelude::*;

use crate::model::{AttributeMap, AttributeValue};
use crate::storage::{Result, StorageError};

pub fn to_sdk_item(image: &AttributeMap) -> Result<HashMap<String, SdkValue>> {
    image
        .iter()
        .map(|(name, value)| Ok((name.clone(), to_sdk(value)?)))
        .collect()
}

pub fn to_sdk(value: &AttributeValue) -> Result<SdkValue> {
    Ok(match value {
        AttributeValue::S(s) => SdkValue::S(s.clone()),
        AttributeValue::N(n) => SdkValue::N(n.clone()),
        AttributeValue::B(b) => SdkValue::B(decode_blob(b)?),
        AttributeValue::Bool(b) => SdkValue::Bool(*b),
        AttributeValue::Null(n) => SdkValue::Null(*n),
        AttributeValue::M(m) => SdkValue::M(to_sdk_item(m)?),
        AttributeValue::L(items) => {
            SdkValue::L(items.iter().map(to_sdk).collect::<Result<_>>()?)
        }
        AttributeValue::Ss(items) => SdkValue::Ss(items.clone()),
        AttributeValue::Ns(items) => SdkValue::Ns(items.clone()),
        AttributeValue::Bs(items) => {
            SdkValue::Bs(items.iter().map(|b| decode_blob(b)).collect::<Result<_>>()?)
        }
    })
}

pub fn from_sdk_item(item: &HashMap<String, SdkValue>) -> Result<AttributeMap> {
    item.iter()
        .map(|(name, value)| Ok((name.clone(), from_sdk(value)?)))
        .collect()
}

pub fn from_sdk(value: &SdkValue) -> Result<AttributeValue> {
    Ok(match value {
        SdkValue::S(s) => AttributeValue::S(s.clone()),
        SdkValue::N(n) => AttributeValue::N(n.clone()),
        SdkValue::B(b) => AttributeValue::binary(b.as_ref()),
        SdkValue::Bool(b) => AttributeValue::Bool(*b),
        SdkValue::Null(n) => AttributeValue::Null(*n),
        SdkValue::M(m) => AttributeValue::M(from_sdk_item(m)?),
        SdkValue::L(items) => AttributeValue::L(items.iter().map(from_sdk).collect::<Result<_>>()?),
        SdkValue::Ss(items) => AttributeValue::Ss(items.clone()),
        SdkValue::Ns(items) => AttributeValue::Ns(items.clone()),
        SdkValue::Bs(items) => AttributeValue::Bs(
            items
                .iter()
                .map(|b| BASE64_STANDARD.encode(b.as_ref()))
                .collect(),
        ),
        other => {
            return Err(StorageError::InvalidItem(format!(
                "unsupported attribute type: {:?}",
                other
            )))
        }
    })
}

fn decode_blob(encoded: &str) -> Result<Blob> {
    BASE64_STANDARD
        .decode(encoded)
        .map(Blob::new)
        .map_err(|e| StorageError::InvalidItem(format!("invalid base64 binary attribute: {}", e)))
}
