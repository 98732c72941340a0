//! Behaviour tests for the enrichment pipeline using cucumber-rs (Gherkin).
//!
//! Appointments are created through the HTTP router backed by the
//! in-memory store. Each "process" step reads the next batch from a single
//! lineage of the in-memory change stream and hands it to the pipe; the
//! cursor only advances when the batch succeeds, the same way the runner
//! drives it.

mod steps;

use cucumber::World;

pub use steps::PipelineWorld;

#[tokio::main]
async fn main() {
    PipelineWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit("tests/pipeline/features")
        .await;
}
