//! Shared record, event and attribute types.

pub mod attribute;
pub mod event;
pub mod record;

pub use attribute::{
    image_to_json, image_to_json_partial, json_to_image, AttributeError, AttributeMap,
    AttributeValue,
};
pub use event::{ChangeEvent, EventName, InsertEvent, StreamRecord, KEY_ATTRIBUTE};
pub use record::{
    patient_email, AppointmentRecord, EnrichedRecord, EnrichmentOutput, RecordError,
    SoftFailRecord, NO_PREFERENCE, PREFERRED_METHOD_FIELD,
};
