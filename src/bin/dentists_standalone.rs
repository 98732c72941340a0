//! dentists-standalone: the whole flow in one process
//!
//! ## Architecture
//! ```text
//! POST /appointments --> InMemoryAppointmentStore
//!                              |
//!                              v
//!                      MemoryChangeStream --> PipeRunner --> Pipe
//!                                                            |
//!                              InMemoryContactDirectory <----+
//!                                                            |
//!                                                            v
//!                                                 ChannelDispatchQueue --> log
//! ```
//!
//! ## Configuration
//! - `--config <path>` or DENTISTS_CONFIG: YAML configuration file
//! - DENTISTS__SERVER__PORT: API port (default 8080)
//! - DENTISTS__STREAM__LINEAGE_COUNT: in-memory lineages (default 4)
//! - DENTISTS_LOG: log filter (default info)

use std::sync::Arc;

use tracing::{info, warn};

use dentists::dlq::ChannelDeadLetterPublisher;
use dentists::handlers;
use dentists::pipe::PipeRunner;
use dentists::queue::ChannelDispatchQueue;
use dentists::storage::{InMemoryAppointmentStore, InMemoryContactDirectory};
use dentists::stream::{MemoryChangeStream, StartingPosition};
use dentists::utils::bootstrap::{build_pipe, init_tracing, load_config, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = load_config()?;
    let addr = config.server.socket_addr()?;

    let stream = Arc::new(MemoryChangeStream::new(config.stream.lineage_count));
    let store = Arc::new(InMemoryAppointmentStore::new(Arc::clone(&stream)));
    let directory = Arc::new(InMemoryContactDirectory::new());

    let (queue, mut dispatched) = ChannelDispatchQueue::new();
    tokio::spawn(async move {
        while let Some(message) = dispatched.recv().await {
            match message.body_json() {
                Ok(body) => info!(
                    event_id = %message.event_id,
                    partition_key = %message.partition_key,
                    outcome = message.body.outcome(),
                    body = %body,
                    "Dispatched"
                ),
                Err(e) => warn!(event_id = %message.event_id, error = %e, "Undecodable dispatch"),
            }
        }
    });

    let (dead_letters, mut parked) = ChannelDeadLetterPublisher::new();
    tokio::spawn(async move {
        while let Some(dead_letter) = parked.recv().await {
            warn!(
                reason = %dead_letter.rejection_reason,
                attempts = dead_letter.attempts,
                events = dead_letter.event_count(),
                "Dead letter"
            );
        }
    });

    let pipe = build_pipe(&config, directory, Arc::new(queue), Arc::new(dead_letters))?;

    // The in-memory stream starts empty, so reading from the start loses nothing
    // written before the first cursor opens.
    let mut runner_config = config.pipe.runner_config(&config.stream);
    runner_config.starting_position = StartingPosition::TrimHorizon;
    let runner = Arc::new(PipeRunner::new(stream, Arc::new(pipe), runner_config));

    let shutdown = shutdown_signal();
    let runner_task = tokio::spawn(runner.run(shutdown.clone()));

    info!(addr = %addr, lineages = config.stream.lineage_count, "dentists-standalone started");

    handlers::serve(store, addr, shutdown).await?;
    runner_task.await?;

    info!("dentists-standalone stopped");
    Ok(())
}
