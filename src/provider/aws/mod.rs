//! AWS provider: S3 object storage and Lambda functions.

mod lambda;
mod storage;

use aws_config::{ConfigLoader, Region, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use tracing::debug;

use crate::config::AwsCredentials;
use crate::error::{DeployError, ProviderError, Result};

use super::Provider;

pub use lambda::{LambdaFunctionClient, resolve_role_arn};
pub use storage::S3ObjectStore;

/// Name reported for credentials built from the credentials file.
const CREDENTIALS_SOURCE: &str = "fndeploy";

/// Loads an SDK configuration for `region` from static credentials.
pub async fn load_sdk_config(credentials: &AwsCredentials, region: &str) -> SdkConfig {
    debug!("Loading AWS configuration for {region}");
    config_loader(credentials, region).load().await
}

fn config_loader(credentials: &AwsCredentials, region: &str) -> ConfigLoader {
    let provider = aws_sdk_s3::config::Credentials::new(
        credentials.aws_access_key_id.clone(),
        credentials.aws_secret_access_key.clone(),
        credentials.aws_session_token.clone(),
        None,
        CREDENTIALS_SOURCE,
    );

    aws_config::from_env()
        .region(Region::new(region.to_string()))
        .credentials_provider(provider)
}

/// SDK configuration pointing every service at a local endpoint.
#[cfg(test)]
pub(crate) async fn test_sdk_config(endpoint: &str) -> SdkConfig {
    let credentials = AwsCredentials {
        aws_access_key_id: String::from("AKIDEXAMPLE"),
        aws_secret_access_key: String::from("secret"),
        aws_session_token: None,
        role: String::from("LabRole"),
    };

    config_loader(&credentials, "us-east-1")
        .endpoint_url(endpoint)
        .retry_config(aws_config::retry::RetryConfig::disabled())
        .load()
        .await
}

/// Wraps an SDK error into a provider API error, keeping its source chain.
fn api_error<E>(operation: &str, err: E) -> DeployError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::api(Provider::Aws, operation, DisplayErrorContext(&err).to_string()).into()
}

/// Converts a size or duration into the signed integer the SDKs expect.
fn to_i32(value: u32, operation: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        ProviderError::api(Provider::Aws, operation, format!("value {value} out of range")).into()
    })
}
