//! HTTP handlers.

pub mod appointments;

pub use appointments::{router, serve};
