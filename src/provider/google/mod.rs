//! Google provider: Cloud Storage and Cloud Functions over their REST APIs.
//!
//! Both APIs share one authenticated HTTP client. Error responses carry a
//! JSON body of the form `{"error": {"code", "message", "status"}}`, which is
//! decoded into an [`ApiFailure`] so that callers can tell conflicts apart
//! from other failures.

mod auth;
mod functions;
mod storage;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::error::{DeployError, ProviderError, Result};

use super::Provider;

pub use auth::{AccessTokenProvider, CLOUD_PLATFORM_SCOPE, ServiceAccountTokens, StaticToken};
pub use functions::{CloudFunctionsClient, DEFAULT_POLL_INTERVAL, MAX_INSTANCES};
pub use storage::GcsObjectStore;

/// Cloud Storage JSON API base URL.
pub const STORAGE_API_URL: &str = "https://storage.googleapis.com/";

/// Cloud Functions API base URL.
pub const FUNCTIONS_API_URL: &str = "https://cloudfunctions.googleapis.com/";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Authenticated HTTP client shared by the Google APIs.
#[derive(Clone)]
pub struct GoogleRestClient {
    /// HTTP client.
    http: Client,
    /// Source of access tokens.
    tokens: Arc<dyn AccessTokenProvider>,
}

impl std::fmt::Debug for GoogleRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleRestClient").finish_non_exhaustive()
    }
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Google API error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// A non-success API response.
#[derive(Debug)]
pub(crate) struct ApiFailure {
    /// HTTP status.
    pub status: StatusCode,
    /// Canonical error code such as `ALREADY_EXISTS`, if reported.
    pub reason: String,
    /// Error message.
    pub message: String,
}

impl ApiFailure {
    /// Decodes a failed response.
    async fn read(response: Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => Self {
                status,
                reason: envelope.error.status,
                message: envelope.error.message,
            },
            Err(_) => Self {
                status,
                reason: String::new(),
                message: body,
            },
        }
    }

    /// Returns true for `409 Conflict`.
    pub fn is_conflict(&self) -> bool {
        self.status == StatusCode::CONFLICT
    }

    /// Converts into the generic error of `operation`.
    pub fn into_error(self, operation: &str) -> DeployError {
        if matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return ProviderError::Auth {
                provider: Provider::Google,
                message: format!("{operation}: {}", self.message),
            }
            .into();
        }

        let message = if self.reason.is_empty() {
            format!("{} {}", self.status, self.message)
        } else {
            format!("{} {}: {}", self.status, self.reason, self.message)
        };
        ProviderError::api(Provider::Google, operation, message).into()
    }
}

impl GoogleRestClient {
    /// Creates a client with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Self::with_timeout(tokens, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(tokens: Arc<dyn AccessTokenProvider>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::api(
                    Provider::Google,
                    "create HTTP client",
                    format!("Failed to create HTTP client: {e}"),
                )
            })?;

        Ok(Self { http, tokens })
    }

    /// Returns the underlying HTTP client for building requests.
    pub(crate) const fn http(&self) -> &Client {
        &self.http
    }

    /// Sends an authenticated request, returning the response whatever its
    /// status.
    pub(crate) async fn send_unchecked(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Response> {
        let authorization = self.tokens.authorization().await?;

        let response = request
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| {
                ProviderError::api(Provider::Google, operation, format!("Request failed: {e}"))
            })?;

        trace!("{operation}: {}", response.status());
        Ok(response)
    }

    /// Sends an authenticated request, failing on non-success statuses.
    pub(crate) async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let response = self.send_unchecked(request, operation).await?;

        if response.status().is_success() {
            return Ok(response);
        }

        Err(ApiFailure::read(response).await.into_error(operation))
    }

    /// Sends a request and decodes its JSON body.
    pub(crate) async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        let response = self.send(request, operation).await?;

        response.json().await.map_err(|e| {
            ProviderError::api(
                Provider::Google,
                operation,
                format!("Failed to parse response: {e}"),
            )
            .into()
        })
    }
}

/// Parses an API base URL.
///
/// # Errors
///
/// Returns an error if the URL is invalid.
pub fn parse_base_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| DeployError::internal(format!("Invalid API URL {url}: {e}")))
}

/// Appends path segments to a base URL, percent-encoding each segment.
fn endpoint<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| DeployError::internal(format!("API URL {base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
