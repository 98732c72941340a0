//! Change-stream events.
//!
//! The wire shape follows the DynamoDB Streams record layout:
//!
//! ```json
//! {
//!   "eventID": "...",
//!   "eventName": "INSERT",
//!   "eventSourceARN": "...",
//!   "dynamodb": { "Keys": {...}, "NewImage": {...}, "SequenceNumber": "..." }
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::attribute::{AttributeMap, AttributeValue};

/// Partition key attribute shared by both tables.
pub const KEY_ATTRIBUTE: &str = "id";

/// Storage mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream-specific part of a change record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamRecord {
    #[serde(default)]
    pub keys: AttributeMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<AttributeMap>,
    #[serde(default)]
    pub sequence_number: String,
}

/// One storage mutation as delivered by the change stream.
///
/// `event_name` stays a raw string: transports may emit names this crate
/// does not know, and filtering is defined over the raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventID", default)]
    pub event_id: String,
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(
        rename = "eventSourceARN",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub event_source_arn: Option<String>,
    pub dynamodb: StreamRecord,
}

impl ChangeEvent {
    /// Build an event for a record keyed by `id`.
    pub fn new(
        event_id: impl Into<String>,
        name: EventName,
        id: &str,
        new_image: Option<AttributeMap>,
        sequence_number: impl Into<String>,
    ) -> Self {
        let mut keys = AttributeMap::new();
        keys.insert(KEY_ATTRIBUTE.to_string(), AttributeValue::S(id.to_string()));
        Self {
            event_id: event_id.into(),
            event_name: name.as_str().to_string(),
            event_source_arn: None,
            dynamodb: StreamRecord {
                keys,
                new_image,
                sequence_number: sequence_number.into(),
            },
        }
    }

    /// Set the source stream identifier.
    pub fn with_source(mut self, arn: impl Into<String>) -> Self {
        self.event_source_arn = Some(arn.into());
        self
    }

    /// Known mutation kind, if the raw name is one of the standard ones.
    pub fn kind(&self) -> Option<EventName> {
        match self.event_name.as_str() {
            "INSERT" => Some(EventName::Insert),
            "MODIFY" => Some(EventName::Modify),
            "REMOVE" => Some(EventName::Remove),
            _ => None,
        }
    }

    /// The originating record key, used for per-key ordering.
    pub fn partition_key(&self) -> Option<&str> {
        self.dynamodb
            .keys
            .get(KEY_ATTRIBUTE)
            .and_then(AttributeValue::as_str)
    }

    pub fn new_image(&self) -> Option<&AttributeMap> {
        self.dynamodb.new_image.as_ref()
    }
}

/// An event that passed the insert-only filter.
///
/// Only constructible from a `ChangeEvent` whose name starts with `INSERT`,
/// so enrichment cannot be handed any other mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertEvent(ChangeEvent);

impl InsertEvent {
    pub const NAME_PREFIX: &'static str = "INSERT";

    pub fn event(&self) -> &ChangeEvent {
        &self.0
    }

    pub fn event_id(&self) -> &str {
        &self.0.event_id
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.0.partition_key()
    }

    pub fn new_image(&self) -> Option<&AttributeMap> {
        self.0.new_image()
    }
}

impl TryFrom<ChangeEvent> for InsertEvent {
    type Error = ChangeEvent;

    fn try_from(event: ChangeEvent) -> Result<Self, Self::Error> {
        if event.event_name.starts_with(Self::NAME_PREFIX) {
            Ok(Self(event))
        } else {
            Err(event)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_stream_record_wire_shape() {
        let raw = json!({
            "eventID": "1",
            "eventName": "INSERT",
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:1:table/DentistTable/stream/x",
            "dynamodb": {
                "Keys": {"id": {"S": "appt-1"}},
                "NewImage": {
                    "id": {"S": "appt-1"},
                    "patient": {"M": {"email": {"S": "a@x.com"}}}
                },
                "SequenceNumber": "100"
            }
        });

        let event: ChangeEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.kind(), Some(EventName::Insert));
        assert_eq!(event.partition_key(), Some("appt-1"));
        assert_eq!(event.dynamodb.sequence_number, "100");
        assert!(event.new_image().unwrap().contains_key("patient"));
    }

    #[test]
    fn test_remove_event_without_image() {
        let raw = json!({
            "eventName": "REMOVE",
            "dynamodb": {"Keys": {"id": {"S": "appt-1"}}}
        });
        let event: ChangeEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.kind(), Some(EventName::Remove));
        assert!(event.new_image().is_none());
    }

    #[test]
    fn test_insert_event_requires_insert_prefix() {
        let insert = ChangeEvent::new("1", EventName::Insert, "a", None, "1");
        assert!(InsertEvent::try_from(insert).is_ok());

        let modify = ChangeEvent::new("2", EventName::Modify, "a", None, "2");
        let rejected = InsertEvent::try_from(modify).unwrap_err();
        assert_eq!(rejected.event_id, "2");

        let mut custom = ChangeEvent::new("3", EventName::Insert, "a", None, "3");
        custom.event_name = "INSERT_BATCH".to_string();
        assert!(InsertEvent::try_from(custom).is_ok());
    }
}
