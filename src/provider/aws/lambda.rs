//! Lambda function client and execution role lookup.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::types::{FunctionCode, Runtime};
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::provider::{FunctionClient, FunctionDefinition, Provider};

use super::{api_error, to_i32};

/// Lambda client bound to one region.
#[derive(Debug, Clone)]
pub struct LambdaFunctionClient {
    client: Client,
}

impl LambdaFunctionClient {
    /// Creates a client from an SDK configuration.
    #[must_use]
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

/// Looks up the ARN of an IAM role.
///
/// # Errors
///
/// Returns an error if the role cannot be read.
pub async fn resolve_role_arn(config: &SdkConfig, role: &str) -> Result<String> {
    let output = aws_sdk_iam::Client::new(config)
        .get_role()
        .role_name(role)
        .send()
        .await
        .map_err(|e| api_error("get role", e))?;

    let arn = output
        .role()
        .map(|r| r.arn().to_string())
        .ok_or_else(|| ProviderError::api(Provider::Aws, "get role", format!("role {role} not found")))?;

    debug!("Resolved role {role} to {arn}");
    Ok(arn)
}

/// Timeout to send, leaving the provider default in place for zero.
fn timeout(function: &FunctionDefinition, operation: &str) -> Result<Option<i32>> {
    if function.timeout_secs == 0 {
        return Ok(None);
    }
    to_i32(function.timeout_secs, operation).map(Some)
}

#[async_trait]
impl FunctionClient for LambdaFunctionClient {
    async fn create_function(&self, function: &FunctionDefinition) -> Result<String> {
        let operation = "create function";
        let role = function.role.as_deref().ok_or_else(|| {
            ProviderError::api(Provider::Aws, operation, "no execution role configured")
        })?;

        let code = FunctionCode::builder()
            .s3_bucket(&function.archive.bucket)
            .s3_key(&function.archive.key)
            .build();

        let result = self
            .client
            .create_function()
            .function_name(&function.name)
            .runtime(Runtime::from(function.runtime.as_str()))
            .role(role)
            .handler(&function.handler)
            .memory_size(to_i32(function.memory_mb, operation)?)
            .set_timeout(timeout(function, operation)?)
            .code(code)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output
                .function_arn()
                .unwrap_or(function.name.as_str())
                .to_string()),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_resource_conflict_exception() {
                    Err(ProviderError::AlreadyExists {
                        provider: Provider::Aws,
                        function: function.name.clone(),
                    }
                    .into())
                } else {
                    Err(api_error(operation, service_err))
                }
            }
        }
    }

    async fn update_function_config(&self, function: &FunctionDefinition) -> Result<()> {
        let operation = "update function configuration";

        let result = self
            .client
            .update_function_configuration()
            .function_name(&function.name)
            .runtime(Runtime::from(function.runtime.as_str()))
            .set_role(function.role.clone())
            .handler(&function.handler)
            .memory_size(to_i32(function.memory_mb, operation)?)
            .set_timeout(timeout(function, operation)?)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_resource_conflict_exception() {
                    Err(ProviderError::UpdateInProgress {
                        provider: Provider::Aws,
                        function: function.name.clone(),
                    }
                    .into())
                } else {
                    Err(api_error(operation, service_err))
                }
            }
        }
    }

    async fn update_function_code(&self, function: &FunctionDefinition) -> Result<String> {
        let result = self
            .client
            .update_function_code()
            .function_name(&function.name)
            .s3_bucket(&function.archive.bucket)
            .s3_key(&function.archive.key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output
                .function_arn()
                .unwrap_or(function.name.as_str())
                .to_string()),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_resource_conflict_exception() {
                    Err(ProviderError::UpdateInProgress {
                        provider: Provider::Aws,
                        function: function.name.clone(),
                    }
                    .into())
                } else {
                    Err(api_error("update function code", service_err))
                }
            }
        }
    }

    async fn list_functions(&self) -> Result<Vec<String>> {
        let mut functions = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_functions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| api_error("list functions", e))?;

            functions.extend(
                output
                    .functions()
                    .iter()
                    .filter_map(|f| f.function_arn().map(str::to_string)),
            );

            match output.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use crate::provider::ArchiveReference;
    use crate::provider::aws::test_sdk_config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn definition(timeout_secs: u32) -> FunctionDefinition {
        FunctionDefinition {
            name: String::from("hello"),
            region: String::from("us-east-1"),
            runtime: String::from("python3.12"),
            memory_mb: 128,
            timeout_secs,
            handler: String::from("main.handler"),
            entry_point: String::from("handler"),
            archive: ArchiveReference::new(Provider::Aws, "bucket", "hello"),
            role: None,
        }
    }

    #[test]
    fn test_zero_timeout_keeps_default() {
        assert_eq!(timeout(&definition(0), "create").unwrap(), None);
        assert_eq!(timeout(&definition(30), "create").unwrap(), Some(30));
    }

    #[test]
    fn test_out_of_range_memory() {
        assert!(to_i32(u32::MAX, "create").is_err());
    }

    fn conflict() -> ResponseTemplate {
        ResponseTemplate::new(409)
            .insert_header("x-amzn-errortype", "ResourceConflictException")
            .set_body_json(serde_json::json!({
                "Type": "User",
                "message": "The operation cannot be performed at this time.",
            }))
    }

    async fn client(server: &MockServer) -> LambdaFunctionClient {
        LambdaFunctionClient::new(&test_sdk_config(&server.uri()).await)
    }

    #[tokio::test]
    async fn test_create_conflict_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2015-03-31/functions"))
            .respond_with(conflict())
            .expect(1)
            .mount(&server)
            .await;

        let mut function = definition(30);
        function.role = Some(String::from("arn:aws:iam::123456789012:role/LabRole"));

        let err = client(&server).await.create_function(&function).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_code_update_conflict_is_in_progress() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/2015-03-31/functions/hello/code"))
            .respond_with(conflict())
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .update_function_code(&definition(30))
            .await
            .unwrap_err();
        assert!(err.is_update_in_progress());
    }

    #[tokio::test]
    async fn test_config_update_other_error_is_api() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/2015-03-31/functions/hello/configuration"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("x-amzn-errortype", "ResourceNotFoundException")
                    .set_body_json(serde_json::json!({
                        "Type": "User",
                        "message": "Function not found",
                    })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .update_function_config(&definition(30))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::Provider(ProviderError::Api { .. })
        ));
    }
}
