//! dentists-pipe: stream-driven enrichment
//!
//! ## Architecture
//! ```text
//! DynamoDB Streams --> PipeRunner --> filter (INSERT) --> enrich --> SQS
//!                                                           |
//!                                           contacts table -+
//! ```
//!
//! ## Configuration
//! - APPOINTMENTS_STREAM_ARN or DENTISTS__STREAM__STREAM_ARN: source stream
//! - `contacts_dynamodb_table` or DENTISTS__CONTACTS__TABLE_NAME: directory table
//! - DISPATCH_QUEUE_URL or DENTISTS__QUEUE__QUEUE_URL: dispatch queue
//! - DENTISTS__DLQ__QUEUE_URL: dead letter queue (optional)

use std::sync::Arc;

use tracing::info;

use dentists::dlq::create_publisher;
use dentists::pipe::PipeRunner;
use dentists::queue::SqsDispatchQueue;
use dentists::storage::DynamoContactDirectory;
use dentists::stream::DynamoChangeStream;
use dentists::utils::aws::load_aws_config;
use dentists::utils::bootstrap::{build_pipe, init_tracing, load_config, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = load_config()?;
    let stream_arn = config.stream.require_stream_arn()?;
    let queue_url = config.queue.require_queue_url()?;
    let endpoint = config.aws.endpoint_url.as_deref();

    let sdk_config = load_aws_config(&config.aws).await;
    let stream = Arc::new(DynamoChangeStream::new(&sdk_config, stream_arn, endpoint));
    let directory = Arc::new(DynamoContactDirectory::new(
        &sdk_config,
        &config.contacts.table_name,
        endpoint,
    ));
    let queue = Arc::new(SqsDispatchQueue::new(&sdk_config, queue_url, endpoint));
    let dead_letters = create_publisher(&config.dlq, &config.aws).await;

    let pipe = build_pipe(&config, directory, queue, dead_letters)?;
    let runner = Arc::new(PipeRunner::new(
        stream,
        Arc::new(pipe),
        config.pipe.runner_config(&config.stream),
    ));

    info!(
        stream_arn = %stream_arn,
        queue = %config.queue.queue_name,
        "dentists-pipe started"
    );

    runner.run(shutdown_signal()).await;

    info!("dentists-pipe stopped");
    Ok(())
}
