use std::io::Write;

use serial_test::serial;

use super::*;
use crate::stream::StartingPosition;

const DEPLOYMENT_VARS: [&str; 4] = [
    APPOINTMENTS_TABLE_ENV_VAR,
    CONTACTS_TABLE_ENV_VAR,
    DISPATCH_QUEUE_URL_ENV_VAR,
    STREAM_ARN_ENV_VAR,
];

fn clear_env() {
    for var in DEPLOYMENT_VARS {
        std::env::remove_var(var);
    }
    std::env::remove_var(CONFIG_ENV_VAR);
    std::env::remove_var("DENTISTS__SERVER__PORT");
    std::env::remove_var("DENTISTS__PIPE__LOOKUP_TIMEOUT_MS");
}

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.appointments.table_name, "DentistTable");
    assert_eq!(config.contacts.table_name, "DentistContactsTable");
    assert_eq!(config.queue.queue_name, "AppointmentsQueue");
    assert_eq!(config.stream.starting_position, StartingPosition::Latest);
    assert!(config.stream.stream_arn.is_none());
    assert!(!config.dlq.is_configured());
}

#[test]
fn test_default_filter_is_insert_only() {
    let config = Config::default();
    let criteria = config.filter_criteria().unwrap();
    assert_eq!(criteria.patterns().len(), 1);
    assert_eq!(criteria, crate::pipe::FilterCriteria::insert_only());
}

#[test]
fn test_default_retry_settings() {
    let config = Config::default();
    assert_eq!(config.pipe.dispatch_retry.max_retries, Some(5));
    assert_eq!(config.pipe.batch_retry.max_retries, None);

    let runner = config.pipe.runner_config(&config.stream);
    assert_eq!(runner.batch_size, 100);
    assert_eq!(runner.poll_interval, std::time::Duration::from_millis(500));
    assert_eq!(runner.batch_retry.max_retries, None);
}

#[test]
fn test_server_socket_addr() {
    let config = Config::default();
    assert_eq!(config.server.socket_addr().unwrap().port(), 8080);

    let mut bad = Config::default();
    bad.server.host = "not an address".to_string();
    assert!(matches!(bad.server.socket_addr(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_required_values() {
    let mut config = Config::default();
    assert!(config.stream.require_stream_arn().is_err());
    assert!(config.queue.require_queue_url().is_err());

    config.stream.stream_arn = Some("arn:aws:dynamodb:stream".to_string());
    config.queue.queue_url = Some("http://localhost:4566/queue/q".to_string());
    assert_eq!(config.stream.require_stream_arn().unwrap(), "arn:aws:dynamodb:stream");
    assert_eq!(
        config.queue.require_queue_url().unwrap(),
        "http://localhost:4566/queue/q"
    );
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = Config::default();
    config.stream.batch_size = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.contacts.table_name = " ".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = Config::default();
    config.pipe.filter_patterns = vec!["{not json".to_string()];
    assert!(matches!(config.validate(), Err(ConfigError::Filter(_))));
}

#[test]
#[serial]
fn test_load_from_file() {
    clear_env();
    let file = yaml_file(
        r#"
server:
  port: 9090
appointments:
  table_name: Appointments
stream:
  starting_position: trim_horizon
  batch_size: 10
pipe:
  lookup_timeout_ms: 500
  batch_retry:
    base_delay_ms: 10
    max_delay_ms: 100
    max_retries: 3
dlq:
  queue_url: http://localhost:4566/queue/dlq
"#,
    );

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.appointments.table_name, "Appointments");
    assert_eq!(config.contacts.table_name, "DentistContactsTable");
    assert_eq!(config.stream.starting_position, StartingPosition::TrimHorizon);
    assert_eq!(config.stream.batch_size, 10);
    assert_eq!(config.pipe.lookup_timeout().as_millis(), 500);
    assert_eq!(config.pipe.batch_retry.max_retries, Some(3));
    assert!(config.dlq.is_configured());
}

#[test]
#[serial]
fn test_partial_batch_retry_keeps_unbounded_default() {
    clear_env();
    let file = yaml_file(
        r#"
pipe:
  batch_retry:
    base_delay_ms: 500
"#,
    );

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.pipe.batch_retry.max_retries, None);

    let batch = config.pipe.runner_config(&config.stream).batch_retry;
    assert_eq!(batch.base_delay, std::time::Duration::from_millis(500));
    assert_eq!(batch.max_delay, std::time::Duration::from_secs(30));
    assert!(batch.should_retry(1_000));
    assert_eq!(config.pipe.dispatch_retry().max_retries, Some(5));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let result = Config::load(Some("/nonexistent/dentists.yaml"));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
#[serial]
fn test_deployment_variables_override() {
    clear_env();
    std::env::set_var(APPOINTMENTS_TABLE_ENV_VAR, "ProdAppointments");
    std::env::set_var(CONTACTS_TABLE_ENV_VAR, "ProdContacts");
    std::env::set_var(DISPATCH_QUEUE_URL_ENV_VAR, "https://sqs/queue");
    std::env::set_var(STREAM_ARN_ENV_VAR, "arn:stream");

    let config = Config::load(None).unwrap();
    clear_env();

    assert_eq!(config.appointments.table_name, "ProdAppointments");
    assert_eq!(config.contacts.table_name, "ProdContacts");
    assert_eq!(config.queue.queue_url.as_deref(), Some("https://sqs/queue"));
    assert_eq!(config.stream.stream_arn.as_deref(), Some("arn:stream"));
}

#[test]
#[serial]
fn test_prefixed_environment_overrides_file() {
    clear_env();
    let file = yaml_file("server:\n  port: 9090\n");
    std::env::set_var("DENTISTS__SERVER__PORT", "7070");
    std::env::set_var("DENTISTS__PIPE__LOOKUP_TIMEOUT_MS", "250");

    let config = Config::load(file.path().to_str()).unwrap();
    clear_env();

    assert_eq!(config.server.port, 7070);
    assert_eq!(config.pipe.lookup_timeout_ms, 250);
}
