//! Appointment records and the two enrichment output shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::attribute::{image_to_json, json_to_image, AttributeError, AttributeMap, AttributeValue};
use super::event::KEY_ATTRIBUTE;

/// Field added to every successfully enriched record.
pub const PREFERRED_METHOD_FIELD: &str = "preferredMethod";

/// Sentinel written when the directory has no entry for the patient.
pub const NO_PREFERENCE: &str = "none";

/// Errors interpreting an appointment payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Appointment payload must be a JSON object")]
    NotAnObject,

    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Field '{0}' is empty")]
    Empty(&'static str),

    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// A stored appointment: a server-generated id plus opaque fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AppointmentRecord {
    /// Build a new record from a creation request body.
    ///
    /// Any client-supplied `id` is replaced with a fresh UUID v4.
    pub fn from_request(body: Value) -> Result<Self, RecordError> {
        let Value::Object(mut fields) = body else {
            return Err(RecordError::NotAnObject);
        };
        fields.remove(KEY_ATTRIBUTE);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            fields,
        })
    }

    /// Storable image, including the `id` key attribute.
    pub fn to_image(&self) -> AttributeMap {
        let mut image = json_to_image(&self.fields);
        image.insert(KEY_ATTRIBUTE.to_string(), AttributeValue::S(self.id.clone()));
        image
    }

    /// Decode a stored image.
    pub fn from_image(image: &AttributeMap) -> Result<Self, RecordError> {
        let mut fields = image_to_json(image)?;
        let id = match fields.remove(KEY_ATTRIBUTE) {
            Some(Value::String(id)) => id,
            Some(_) => {
                return Err(RecordError::WrongType {
                    field: KEY_ATTRIBUTE,
                    expected: "string",
                })
            }
            None => return Err(RecordError::MissingField(KEY_ATTRIBUTE)),
        };
        Ok(Self { id, fields })
    }

    pub fn patient_email(&self) -> Result<&str, RecordError> {
        patient_email(&self.fields)
    }
}

/// Extract the patient email from a decoded record.
///
/// Reads `patient.email`, falling back to the nested
/// `appointment.patient.email` layout.
pub fn patient_email(fields: &Map<String, Value>) -> Result<&str, RecordError> {
    let patient = match fields.get("patient") {
        Some(patient) => patient,
        None => fields
            .get("appointment")
            .and_then(|a| a.get("patient"))
            .ok_or(RecordError::MissingField("patient.email"))?,
    };

    let email = patient
        .as_object()
        .ok_or(RecordError::WrongType {
            field: "patient",
            expected: "object",
        })?
        .get("email")
        .ok_or(RecordError::MissingField("patient.email"))?
        .as_str()
        .ok_or(RecordError::WrongType {
            field: "patient.email",
            expected: "string",
        })?;

    if email.trim().is_empty() {
        return Err(RecordError::Empty("patient.email"));
    }
    Ok(email)
}

/// A record augmented with the patient's preferred contact method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: Map<String, Value>,
    #[serde(rename = "preferredMethod")]
    pub preferred_method: String,
}

impl EnrichedRecord {
    pub fn new(mut record: Map<String, Value>, preferred_method: impl Into<String>) -> Self {
        record.remove(PREFERRED_METHOD_FIELD);
        Self {
            record,
            preferred_method: preferred_method.into(),
        }
    }

    /// Record for a patient with no directory entry.
    pub fn without_preference(record: Map<String, Value>) -> Self {
        Self::new(record, NO_PREFERENCE)
    }
}

/// Output for an event whose data could not be enriched.
///
/// Carries the error description and whatever part of the record was
/// decoded, so consumers can tell it apart from a successful enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftFailRecord {
    pub error: String,
    pub body: Map<String, Value>,
}

impl SoftFailRecord {
    pub fn new(error: impl std::fmt::Display, body: Map<String, Value>) -> Self {
        Self {
            error: format!("Exception={}", error),
            body,
        }
    }
}

/// One enrichment result per input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnrichmentOutput {
    SoftFail(SoftFailRecord),
    Enriched(EnrichedRecord),
}

impl EnrichmentOutput {
    pub fn is_soft_fail(&self) -> bool {
        matches!(self, Self::SoftFail(_))
    }

    /// Preferred method, when enrichment succeeded.
    pub fn preferred_method(&self) -> Option<&str> {
        match self {
            Self::Enriched(record) => Some(&record.preferred_method),
            Self::SoftFail(_) => None,
        }
    }

    /// Short label for logs and message attributes.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Enriched(_) => "enriched",
            Self::SoftFail(_) => "soft_fail",
        }
    }
}

impl From<EnrichedRecord> for EnrichmentOutput {
    fn from(record: EnrichedRecord) -> Self {
        Self::Enriched(record)
    }
}

impl From<SoftFailRecord> for EnrichmentOutput {
    fn from(record: SoftFailRecord) -> Self {
        Self::SoftFail(record)
    }
}
