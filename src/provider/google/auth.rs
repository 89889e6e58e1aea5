//! OAuth access tokens for the Google REST APIs.

use async_trait::async_trait;
use gcloud_sdk::{GoogleAuthTokenGenerator, TokenSourceType};

use crate::error::{ProviderError, Result};
use crate::provider::Provider;

/// Scope covering Cloud Storage and Cloud Functions.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Supplies the `Authorization` header value of API requests.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Returns a header value such as `Bearer ya29...`.
    async fn authorization(&self) -> Result<String>;
}

/// Tokens minted from service-account credentials, refreshed on expiry.
pub struct ServiceAccountTokens {
    generator: GoogleAuthTokenGenerator,
}

impl std::fmt::Debug for ServiceAccountTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokens").finish_non_exhaustive()
    }
}

impl ServiceAccountTokens {
    /// Creates a token source from a service-account key.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the key is rejected.
    pub async fn new(service_account_json: &str) -> Result<Self> {
        let generator = GoogleAuthTokenGenerator::new(
            TokenSourceType::Json(service_account_json.to_string()),
            vec![CLOUD_PLATFORM_SCOPE.to_string()],
        )
        .await
        .map_err(|e| ProviderError::Auth {
            provider: Provider::Google,
            message: e.to_string(),
        })?;

        Ok(Self { generator })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountTokens {
    async fn authorization(&self) -> Result<String> {
        let token = self
            .generator
            .create_token()
            .await
            .map_err(|e| ProviderError::Auth {
                provider: Provider::Google,
                message: e.to_string(),
            })?;

        Ok(token.header_value())
    }
}

/// A fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Creates a provider that always returns `Bearer <token>`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn authorization(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.0))
    }
}
