//! Typed attribute values as stored in the key-value tables.
//!
//! Mirrors the DynamoDB wire encoding (`{"S": "..."}`, `{"M": {...}}`) so
//! change-stream images and table items decode without a per-field schema.
//! Conversion to plain JSON follows the usual type (de)serializer rules:
//! numbers become JSON numbers, sets become arrays, binary becomes base64 text.

use std::collections::HashMap;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A stored item or stream image: attribute name to typed value.
pub type AttributeMap = HashMap<String, AttributeValue>;

/// Errors converting between typed attributes and JSON.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributeError {
    #[error("Invalid number attribute '{0}'")]
    InvalidNumber(String),

    #[error("Number '{0}' cannot be represented as JSON")]
    UnrepresentableNumber(String),

    #[error("Attribute '{name}': {source}")]
    Field {
        name: String,
        #[source]
        source: Box<AttributeError>,
    },
}

/// A single typed attribute value.
///
/// Binary variants carry base64 text, exactly as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "B")]
    B(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "M")]
    M(AttributeMap),
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<String>),
}

impl AttributeValue {
    /// Build a binary attribute from raw bytes.
    pub fn binary(bytes: &[u8]) -> Self {
        Self::B(BASE64_STANDARD.encode(bytes))
    }

    /// String value, if this is an `S` attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to plain JSON.
    pub fn to_json(&self) -> Result<Value, AttributeError> {
        Ok(match self {
            Self::S(s) => Value::String(s.clone()),
            Self::N(n) => Value::Number(parse_number(n)?),
            Self::B(b) => Value::String(b.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Null(_) => Value::Null,
            Self::M(m) => Value::Object(image_to_json(m)?),
            Self::L(items) => Value::Array(
                items
                    .iter()
                    .map(AttributeValue::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Self::Ss(items) | Self::Bs(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            Self::Ns(items) => Value::Array(
                items
                    .iter()
                    .map(|n| parse_number(n).map(Value::Number))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Convert from plain JSON.
    ///
    /// Arrays always become lists; sets are never inferred.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null(true),
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::N(n.to_string()),
            Value::String(s) => Self::S(s.clone()),
            Value::Array(items) => Self::L(items.iter().map(Self::from_json).collect()),
            Value::Object(fields) => Self::M(json_to_image(fields)),
        }
    }
}

fn parse_number(raw: &str) -> Result<Number, AttributeError> {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = trimmed.parse::<u64>() {
        return Ok(Number::from(u));
    }
    let f = trimmed
        .parse::<f64>()
        .map_err(|_| AttributeError::InvalidNumber(raw.to_string()))?;
    Number::from_f64(f).ok_or_else(|| AttributeError::UnrepresentableNumber(raw.to_string()))
}

/// Convert a whole image to a JSON object.
pub fn image_to_json(image: &AttributeMap) -> Result<Map<String, Value>, AttributeError> {
    match image_to_json_partial(image) {
        (fields, None) => Ok(fields),
        (_, Some(err)) => Err(err),
    }
}

/// Convert an image, keeping every attribute that decodes.
///
/// Returns the decoded fields plus the first error encountered (by
/// attribute name order), so callers can report bad data alongside the
/// best-effort record.
pub fn image_to_json_partial(image: &AttributeMap) -> (Map<String, Value>, Option<AttributeError>) {
    let mut names: Vec<&String> = image.keys().collect();
    names.sort();

    let mut fields = Map::new();
    let mut first_error = None;
    for name in names {
        match image[name].to_json() {
            Ok(value) => {
                fields.insert(name.clone(), value);
            }
            Err(source) => {
                if first_error.is_none() {
                    first_error = Some(AttributeError::Field {
                        name: name.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }
    }
    (fields, first_error)
}

/// Convert a JSON object to a storable image.
pub fn json_to_image(fields: &Map<String, Value>) -> AttributeMap {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_decodes_nested_image() {
        let raw = json!({
            "id": {"S": "appt-1"},
            "patient": {"M": {"email": {"S": "a@x.com"}, "age": {"N": "42"}}},
            "reminders": {"L": [{"N": "1.5"}, {"BOOL": true}, {"NULL": true}]}
        });
        let image: AttributeMap = serde_json::from_value(raw).unwrap();

        let fields = image_to_json(&image).unwrap();
        assert_eq!(
            Value::Object(fields),
            json!({
                "id": "appt-1",
                "patient": {"email": "a@x.com", "age": 42},
                "reminders": [1.5, true, null]
            })
        );
    }

    #[test]
    fn test_sets_become_arrays() {
        let value = AttributeValue::Ns(vec!["3".to_string(), "-7".to_string()]);
        assert_eq!(value.to_json().unwrap(), json!([3, -7]));

        let value = AttributeValue::Ss(vec!["sms".to_string()]);
        assert_eq!(value.to_json().unwrap(), json!(["sms"]));
    }

    #[test]
    fn test_binary_is_base64_text() {
        let value = AttributeValue::binary(b"hi");
        assert_eq!(value.to_json().unwrap(), json!("aGk="));
    }

    #[test]
    fn test_invalid_number_is_reported_with_field_name() {
        let mut image = AttributeMap::new();
        image.insert("time".to_string(), AttributeValue::S("10:00".to_string()));
        image.insert("count".to_string(), AttributeValue::N("many".to_string()));

        let (fields, err) = image_to_json_partial(&image);
        assert_eq!(fields.get("time"), Some(&json!("10:00")));
        assert!(!fields.contains_key("count"));

        let err = err.unwrap();
        assert!(err.to_string().contains("count"));
        assert!(image_to_json(&image).is_err());
    }

    #[test]
    fn test_json_object_becomes_map_attribute() {
        let value = AttributeValue::from_json(&json!({"email": "a@x.com", "n": 2}));
        match value {
            AttributeValue::M(m) => {
                assert_eq!(m["email"], AttributeValue::S("a@x.com".to_string()));
                assert_eq!(m["n"], AttributeValue::N("2".to_string()));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }
}
