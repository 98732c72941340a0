//! Application configuration.
//!
//! Aggregates every section into a single `Config` that can be loaded from
//! YAML files and environment variables.

mod pipeline;
mod server;

pub use pipeline::{PipeConfig, QueueConfig, StreamConfig, TableConfig};
pub use server::{AwsConfig, ServerConfig};

use serde::Deserialize;
use tracing::debug;

use crate::dlq::DlqConfig;
use crate::pipe::{FilterCriteria, FilterError};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "DENTISTS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "DENTISTS";

/// Deployment variable naming the appointments table.
pub const APPOINTMENTS_TABLE_ENV_VAR: &str = "dynamodb_table";
/// Deployment variable naming the contacts table.
pub const CONTACTS_TABLE_ENV_VAR: &str = "contacts_dynamodb_table";
/// Deployment variable with the dispatch queue URL.
pub const DISPATCH_QUEUE_URL_ENV_VAR: &str = "DISPATCH_QUEUE_URL";
/// Deployment variable with the appointments table stream ARN.
pub const STREAM_ARN_ENV_VAR: &str = "APPOINTMENTS_STREAM_ARN";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server for the create endpoint.
    pub server: ServerConfig,
    /// Appointment store table.
    pub appointments: TableConfig,
    /// Contact directory table.
    pub contacts: TableConfig,
    /// Change stream.
    pub stream: StreamConfig,
    /// Dispatch queue.
    pub queue: QueueConfig,
    /// Filter, timeouts and retries.
    pub pipe: PipeConfig,
    /// Dead letter queue.
    pub dlq: DlqConfig,
    /// AWS region and endpoint override.
    pub aws: AwsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            appointments: TableConfig::new("DentistTable"),
            contacts: TableConfig::new("DentistContactsTable"),
            stream: StreamConfig::default(),
            queue: QueueConfig::default(),
            pipe: PipeConfig::default(),
            dlq: DlqConfig::default(),
            aws: AwsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///    (`DENTISTS__QUEUE__QUEUE_URL`)
    /// 5. Deployment variables (`dynamodb_table`, `contacts_dynamodb_table`,
    ///    `DISPATCH_QUEUE_URL`, `APPOINTMENTS_STREAM_ARN`)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let loaded = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = loaded.try_deserialize()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply the deployment-level environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(table) = std::env::var(APPOINTMENTS_TABLE_ENV_VAR) {
            debug!(table = %table, "Appointments table from environment");
            self.appointments.table_name = table;
        }
        if let Ok(table) = std::env::var(CONTACTS_TABLE_ENV_VAR) {
            debug!(table = %table, "Contacts table from environment");
            self.contacts.table_name = table;
        }
        if let Ok(url) = std::env::var(DISPATCH_QUEUE_URL_ENV_VAR) {
            self.queue.queue_url = Some(url);
        }
        if let Ok(arn) = std::env::var(STREAM_ARN_ENV_VAR) {
            self.stream.stream_arn = Some(arn);
        }
    }

    /// Check values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.appointments.table_name.trim().is_empty() {
            return Err(ConfigError::Invalid("appointments.table_name is empty".to_string()));
        }
        if self.contacts.table_name.trim().is_empty() {
            return Err(ConfigError::Invalid("contacts.table_name is empty".to_string()));
        }
        if self.stream.batch_size == 0 {
            return Err(ConfigError::Invalid("stream.batch_size must be at least 1".to_string()));
        }
        if self.stream.lineage_count == 0 {
            return Err(ConfigError::Invalid("stream.lineage_count must be at least 1".to_string()));
        }
        if self.pipe.lookup_timeout_ms == 0 || self.pipe.enqueue_timeout_ms == 0 {
            return Err(ConfigError::Invalid("pipe timeouts must be positive".to_string()));
        }
        self.filter_criteria()?;
        Ok(())
    }

    /// Parsed filter criteria.
    pub fn filter_criteria(&self) -> Result<FilterCriteria, ConfigError> {
        Ok(FilterCriteria::from_json_patterns(&self.pipe.filter_patterns)?)
    }
}

#[cfg(test)]
mod tests;
