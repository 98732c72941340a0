//! Dentists - appointment store with contact preference enrichment
//!
//! Appointments are written once through the HTTP API. Every insert flows
//! from the table's change stream through a filter and an enrichment step
//! that attaches the patient's preferred contact method, then onto a
//! dispatch queue for downstream notification.

pub mod config;
pub mod dlq;
pub mod handlers;
pub mod model;
pub mod pipe;
pub mod queue;
pub mod storage;
pub mod stream;
pub mod utils;
