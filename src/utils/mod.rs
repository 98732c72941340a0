//! Pure utility functions.
//!
//! These are stateless helpers shared by the library and the binaries.

#[cfg(any(feature = "dynamo", feature = "sqs"))]
pub mod aws;
pub mod bootstrap;
pub mod retry;
