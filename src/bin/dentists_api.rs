//! dentists-api: appointment creation endpoint
//!
//! Accepts `POST /appointments`, stamps a fresh id and writes the record to
//! the DynamoDB appointments table. Enrichment happens downstream, driven
//! by the table's stream.
//!
//! ## Configuration
//! - `dynamodb_table` or DENTISTS__APPOINTMENTS__TABLE_NAME: appointments table
//! - DENTISTS__SERVER__PORT: API port (default 8080)
//! - DENTISTS__AWS__ENDPOINT_URL: endpoint override (LocalStack, DynamoDB Local)

use std::sync::Arc;

use tracing::info;

use dentists::handlers;
use dentists::storage::DynamoAppointmentStore;
use dentists::utils::aws::load_aws_config;
use dentists::utils::bootstrap::{init_tracing, load_config, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = load_config()?;
    let addr = config.server.socket_addr()?;

    let sdk_config = load_aws_config(&config.aws).await;
    let store = Arc::new(DynamoAppointmentStore::new(
        &sdk_config,
        &config.appointments.table_name,
        config.aws.endpoint_url.as_deref(),
    ));

    info!(addr = %addr, "dentists-api started");

    handlers::serve(store, addr, shutdown_signal()).await?;
    Ok(())
}
