//! Shared AWS SDK configuration loading.

use tracing::info;

use crate::config::AwsConfig;

/// Load the SDK configuration, applying the configured region if any.
///
/// Endpoint overrides are applied per client, since each service
/// builder takes its own.
pub async fn load_aws_config(config: &AwsConfig) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;
    info!(
        region = ?sdk_config.region().map(|r| r.to_string()),
        endpoint = ?config.endpoint_url,
        "Loaded AWS configuration"
    );
    sdk_config
}
