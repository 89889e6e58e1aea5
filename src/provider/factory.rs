//! Production client factory.
//!
//! Builds provider clients from a [`CredentialsHolder`]. AWS SDK
//! configurations are loaded once per region, the execution role ARN is looked
//! up once per run, and all Google clients share one token source.

use async_trait::async_trait;
use aws_config::SdkConfig;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::CredentialsHolder;
use crate::error::Result;
use crate::orchestrator::ClientFactory;
use crate::stager::KeyedOnce;

use super::aws::{self, LambdaFunctionClient, S3ObjectStore};
use super::google::{CloudFunctionsClient, GcsObjectStore, GoogleRestClient, ServiceAccountTokens};
use super::{FunctionClient, ObjectStore, Provider};

/// Builds real AWS and Google clients.
#[derive(Debug)]
pub struct CloudClients {
    credentials: Arc<CredentialsHolder>,
    aws_configs: KeyedOnce<String, SdkConfig>,
    aws_role: OnceCell<String>,
    google: OnceCell<GoogleRestClient>,
}

impl CloudClients {
    /// Creates a factory over loaded credentials.
    #[must_use]
    pub fn new(credentials: Arc<CredentialsHolder>) -> Self {
        Self {
            credentials,
            aws_configs: KeyedOnce::new(),
            aws_role: OnceCell::new(),
            google: OnceCell::new(),
        }
    }

    async fn aws_config(&self, region: &str) -> Result<SdkConfig> {
        let credentials = self.credentials.aws()?;
        self.aws_configs
            .get_or_try_init(&region.to_string(), || async {
                Ok(aws::load_sdk_config(credentials, region).await)
            })
            .await
    }

    async fn google_rest(&self) -> Result<(GoogleRestClient, &str)> {
        let credentials = self.credentials.google()?;
        let rest = self
            .google
            .get_or_try_init(|| async {
                debug!("Creating Google token source for {}", credentials.project_id);
                let tokens = ServiceAccountTokens::new(&credentials.service_account_json).await?;
                GoogleRestClient::new(Arc::new(tokens))
            })
            .await?;
        Ok((rest.clone(), credentials.project_id.as_str()))
    }
}

#[async_trait]
impl ClientFactory for CloudClients {
    async fn object_store(&self, provider: Provider, region: &str) -> Result<Arc<dyn ObjectStore>> {
        match provider {
            Provider::Aws => {
                let config = self.aws_config(region).await?;
                Ok(Arc::new(S3ObjectStore::new(&config)))
            }
            Provider::Google => {
                let (rest, project) = self.google_rest().await?;
                Ok(Arc::new(GcsObjectStore::new(rest, project)?))
            }
        }
    }

    async fn function_client(
        &self,
        provider: Provider,
        region: &str,
    ) -> Result<Arc<dyn FunctionClient>> {
        match provider {
            Provider::Aws => {
                let config = self.aws_config(region).await?;
                Ok(Arc::new(LambdaFunctionClient::new(&config)))
            }
            Provider::Google => {
                let (rest, project) = self.google_rest().await?;
                Ok(Arc::new(CloudFunctionsClient::new(rest, project, region)?))
            }
        }
    }

    async fn execution_role(&self, provider: Provider) -> Result<Option<String>> {
        match provider {
            Provider::Aws => {
                let role = &self.credentials.aws()?.role;
                let arn = self
                    .aws_role
                    .get_or_try_init(|| async {
                        let config = self.aws_config(Provider::Aws.default_region()).await?;
                        aws::resolve_role_arn(&config, role).await
                    })
                    .await?;
                Ok(Some(arn.clone()))
            }
            Provider::Google => Ok(None),
        }
    }
}
