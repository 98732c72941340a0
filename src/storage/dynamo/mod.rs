//! DynamoDB storage implementations.

mod appointment_store;
mod contact_directory;
pub mod convert;

pub use appointment_store::DynamoAppointmentStore;
pub use contact_directory::DynamoContactDirectory;

/// Build a DynamoDB client, honouring an endpoint override for local testing.
pub(crate) fn client(
    sdk_config: &aws_config::SdkConfig,
    endpoint_url: Option<&str>,
) -> aws_sdk_dynamodb::Client {
    match endpoint_url {
        Some(endpoint) => {
            let config = aws_sdk_dynamodb::config::Builder::from(sdk_config)
                .endpoint_url(endpoint)
                .build();
            aws_sdk_dynamodb::Client::from_conf(config)
        }
        None => aws_sdk_dynamodb::Client::new(sdk_config),
    }
}
