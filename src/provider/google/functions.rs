//! Cloud Functions (v1) client.
//!
//! Create and patch calls return long-running operations, which are polled
//! until done before the function counts as deployed.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::provider::{FunctionClient, FunctionDefinition, Provider};

use super::{ApiFailure, FUNCTIONS_API_URL, GoogleRestClient, endpoint, parse_base_url};

/// Default delay between operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Instance cap set on every deployed function.
pub const MAX_INSTANCES: u32 = 5;

/// Fields changed by a configuration update.
const CONFIG_UPDATE_MASK: &str = "entryPoint,runtime,availableMemoryMb,timeout,maxInstances";

/// Field changed by a code update.
const CODE_UPDATE_MASK: &str = "sourceArchiveUrl";

/// Cloud Functions client of one project and region.
#[derive(Debug, Clone)]
pub struct CloudFunctionsClient {
    rest: GoogleRestClient,
    base_url: Url,
    project: String,
    region: String,
    poll_interval: Duration,
}

/// Function resource as sent to the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_memory_mb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_archive_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    https_trigger: Option<HttpsTrigger>,
}

#[derive(Debug, Serialize)]
struct HttpsTrigger {}

/// Long-running operation.
#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionList {
    #[serde(default)]
    functions: Vec<FunctionResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FunctionResource {
    name: String,
}

impl CloudFunctionsClient {
    /// Creates a client for `project` and `region` against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid.
    pub fn new(
        rest: GoogleRestClient,
        project: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self> {
        Self::with_base_url(rest, project, region, FUNCTIONS_API_URL)
    }

    /// Creates a client against a custom API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_base_url(
        rest: GoogleRestClient,
        project: impl Into<String>,
        region: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            rest,
            base_url: parse_base_url(base_url)?,
            project: project.into(),
            region: region.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Sets the delay between operation polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn location(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.region)
    }

    fn function_name(&self, function: &str) -> String {
        format!("{}/functions/{function}", self.location())
    }

    /// URL of a resource given by its relative name.
    fn resource_url(&self, name: &str) -> Result<Url> {
        endpoint(&self.base_url, std::iter::once("v1").chain(name.split('/')))
    }

    /// Polls an operation until it is done.
    async fn wait(&self, mut operation: Operation, function: &str) -> Result<()> {
        while !operation.done {
            debug!("Waiting for operation {} on {function}", operation.name);
            tokio::time::sleep(self.poll_interval).await;

            let request = self.rest.http().get(self.resource_url(&operation.name)?);
            operation = self.rest.send_json(request, "poll operation").await?;
        }

        match operation.error {
            Some(error) => Err(ProviderError::OperationFailed {
                provider: Provider::Google,
                operation: operation.name,
                message: error.message,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Sends a patch and waits for it, mapping conflicts to
    /// [`ProviderError::UpdateInProgress`].
    async fn patch(
        &self,
        request: RequestBuilder,
        function: &FunctionDefinition,
        operation: &str,
    ) -> Result<()> {
        let response = self.rest.send_unchecked(request, operation).await?;

        if !response.status().is_success() {
            let failure = ApiFailure::read(response).await;
            if failure.is_conflict() {
                return Err(ProviderError::UpdateInProgress {
                    provider: Provider::Google,
                    function: function.name.clone(),
                }
                .into());
            }
            return Err(failure.into_error(operation));
        }

        let pending: Operation = response.json().await.map_err(|e| {
            ProviderError::api(Provider::Google, operation, format!("Failed to parse response: {e}"))
        })?;
        self.wait(pending, &function.name).await
    }
}

/// Formats a timeout as a protobuf duration, `None` keeping the default.
fn duration(timeout_secs: u32) -> Option<String> {
    (timeout_secs > 0).then(|| format!("{timeout_secs}s"))
}

#[async_trait]
impl FunctionClient for CloudFunctionsClient {
    async fn create_function(&self, function: &FunctionDefinition) -> Result<String> {
        let operation = "create function";
        let name = self.function_name(&function.name);
        let body = CloudFunction {
            name: Some(name.clone()),
            entry_point: Some(function.entry_point.clone()),
            runtime: Some(function.runtime.clone()),
            available_memory_mb: Some(function.memory_mb),
            timeout: duration(function.timeout_secs),
            max_instances: Some(MAX_INSTANCES),
            source_archive_url: Some(function.archive.uri()),
            https_trigger: Some(HttpsTrigger {}),
        };

        let url = endpoint(
            &self.base_url,
            ["v1", "projects", self.project.as_str(), "locations", self.region.as_str(), "functions"],
        )?;
        let request = self.rest.http().post(url).json(&body);
        let response = self.rest.send_unchecked(request, operation).await?;

        if !response.status().is_success() {
            let failure = ApiFailure::read(response).await;
            if failure.is_conflict() {
                return Err(ProviderError::AlreadyExists {
                    provider: Provider::Google,
                    function: function.name.clone(),
                }
                .into());
            }
            return Err(failure.into_error(operation));
        }

        let pending: Operation = response.json().await.map_err(|e| {
            ProviderError::api(Provider::Google, operation, format!("Failed to parse response: {e}"))
        })?;
        self.wait(pending, &function.name).await?;

        Ok(name)
    }

    async fn update_function_config(&self, function: &FunctionDefinition) -> Result<()> {
        let name = self.function_name(&function.name);
        let body = CloudFunction {
            name: None,
            entry_point: Some(function.entry_point.clone()),
            runtime: Some(function.runtime.clone()),
            available_memory_mb: Some(function.memory_mb),
            timeout: duration(function.timeout_secs),
            max_instances: Some(MAX_INSTANCES),
            source_archive_url: None,
            https_trigger: None,
        };

        let request = self
            .rest
            .http()
            .patch(self.resource_url(&name)?)
            .query(&[("updateMask", CONFIG_UPDATE_MASK)])
            .json(&body);

        self.patch(request, function, "update function configuration")
            .await
    }

    async fn update_function_code(&self, function: &FunctionDefinition) -> Result<String> {
        let name = self.function_name(&function.name);
        let body = CloudFunction {
            name: None,
            entry_point: None,
            runtime: None,
            available_memory_mb: None,
            timeout: None,
            max_instances: None,
            source_archive_url: Some(function.archive.uri()),
            https_trigger: None,
        };

        let request = self
            .rest
            .http()
            .patch(self.resource_url(&name)?)
            .query(&[("updateMask", CODE_UPDATE_MASK)])
            .json(&body);

        self.patch(request, function, "update function code").await?;
        Ok(name)
    }

    async fn list_functions(&self) -> Result<Vec<String>> {
        let mut functions = Vec::new();
        let mut page_token: Option<String> = None;
        let url = endpoint(
            &self.base_url,
            ["v1", "projects", self.project.as_str(), "locations", self.region.as_str(), "functions"],
        )?;

        loop {
            let mut request = self.rest.http().get(url.clone());
            if let Some(token) = page_token.take() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: FunctionList = self.rest.send_json(request, "list functions").await?;
            functions.extend(page.functions.into_iter().map(|f| f.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
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
    use crate::provider::google::StaticToken;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FUNCTION: &str = "projects/demo/locations/europe-west3/functions/hello";

    fn definition() -> FunctionDefinition {
        FunctionDefinition {
            name: String::from("hello"),
            region: String::from("europe-west3"),
            runtime: String::from("python312"),
            memory_mb: 256,
            timeout_secs: 30,
            handler: String::from("handler"),
            entry_point: String::from("handler"),
            archive: ArchiveReference::new(Provider::Google, "godeploy-deployments", "fn.zip"),
            role: None,
        }
    }

    fn client(server: &MockServer) -> CloudFunctionsClient {
        let rest = GoogleRestClient::new(Arc::new(StaticToken::new("token"))).unwrap();
        CloudFunctionsClient::with_base_url(rest, "demo", "europe-west3", &server.uri())
            .unwrap()
            .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_create_waits_for_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/locations/europe-west3/functions"))
            .and(body_json(json!({
                "name": FUNCTION,
                "entryPoint": "handler",
                "runtime": "python312",
                "availableMemoryMb": 256,
                "timeout": "30s",
                "maxInstances": 5,
                "sourceArchiveUrl": "gs://godeploy-deployments/fn.zip",
                "httpsTrigger": {}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"name": "operations/op-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/operations/op-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "operations/op-1", "done": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_function(&definition()).await.unwrap();
        assert_eq!(id, FUNCTION);
    }

    #[tokio::test]
    async fn test_create_conflict_is_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/locations/europe-west3/functions"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": 409, "message": "Function already exists", "status": "ALREADY_EXISTS"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).create_function(&definition()).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_failed_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/locations/europe-west3/functions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/op-2",
                "done": true,
                "error": {"code": 3, "message": "Build failed"}
            })))
            .mount(&server)
            .await;

        let result = client(&server).create_function(&definition()).await;
        assert!(matches!(
            result,
            Err(DeployError::Provider(ProviderError::OperationFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_code_patches_source_only() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/{FUNCTION}")))
            .and(query_param("updateMask", "sourceArchiveUrl"))
            .and(body_json(json!({
                "sourceArchiveUrl": "gs://godeploy-deployments/fn.zip"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/op-3",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).update_function_code(&definition()).await.unwrap();
        assert_eq!(id, FUNCTION);
    }

    #[tokio::test]
    async fn test_update_conflict_is_in_progress() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/{FUNCTION}")))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": 409, "message": "An operation is in progress", "status": "ABORTED"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(
            client
                .update_function_code(&definition())
                .await
                .unwrap_err()
                .is_update_in_progress()
        );
        assert!(
            client
                .update_function_config(&definition())
                .await
                .unwrap_err()
                .is_update_in_progress()
        );
    }

    #[tokio::test]
    async fn test_update_config_mask() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/{FUNCTION}")))
            .and(query_param("updateMask", CONFIG_UPDATE_MASK))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/op-4",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).update_function_config(&definition()).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_functions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/demo/locations/europe-west3/functions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "functions": [{"name": FUNCTION}]
            })))
            .mount(&server)
            .await;

        let functions = client(&server).list_functions().await.unwrap();
        assert_eq!(functions, vec![FUNCTION]);
    }

    #[test]
    fn test_duration_format() {
        assert_eq!(duration(0), None);
        assert_eq!(duration(60).as_deref(), Some("60s"));
    }
}
