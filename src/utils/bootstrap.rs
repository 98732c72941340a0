//! Bootstrap utilities for the dentists binaries.
//!
//! Shared initialization code for every binary.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ConfigError};
use crate::dlq::DeadLetterPublisher;
use crate::pipe::{ContactEnricher, Pipe};
use crate::queue::DispatchQueue;
use crate::storage::ContactDirectory;

/// Environment variable holding the log filter.
pub const LOG_ENV_VAR: &str = "DENTISTS_LOG";

/// Environment variable selecting the log format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "DENTISTS_LOG_FORMAT";

/// Initialize tracing with the DENTISTS_LOG environment variable.
///
/// Defaults to "info" level if DENTISTS_LOG is not set. Set
/// DENTISTS_LOG_FORMAT=json for JSON lines.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Read `--config <path>` (or `--config=<path>`) from the arguments.
pub fn parse_config_path<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Load configuration, honoring `--config` from the process arguments.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(path.as_deref().and_then(|p| p.to_str()))?;
    info!(
        appointments_table = %config.appointments.table_name,
        contacts_table = %config.contacts.table_name,
        queue = %config.queue.queue_name,
        "Configuration loaded"
    );
    Ok(config)
}

/// Assemble the pipe from its clients and the `pipe` configuration section.
pub fn build_pipe(
    config: &Config,
    directory: Arc<dyn ContactDirectory>,
    queue: Arc<dyn DispatchQueue>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
) -> Result<Pipe, ConfigError> {
    let enricher = ContactEnricher::new(directory).with_lookup_timeout(config.pipe.lookup_timeout());
    Ok(Pipe::new(Arc::new(enricher), queue)
        .with_filter(config.filter_criteria()?)
        .with_dead_letters(dead_letters)
        .with_dispatch_retry(config.pipe.dispatch_retry())
        .with_enqueue_timeout(config.pipe.enqueue_timeout()))
}

/// Shutdown signal flipped to `true` on ctrl-c.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = tx.send(true);
    });
    rx
}

/// Resolves once the watch flips to `true` or its sender is dropped.
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
