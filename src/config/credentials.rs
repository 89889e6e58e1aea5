//! Provider credential loading.
//!
//! Credentials live next to the deployment file in `aws-credentials.yaml` and
//! `google-credentials.yaml`. Only the providers a deployment references are
//! loaded, and the resulting [`CredentialsHolder`] is read-only afterwards.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::provider::Provider;

/// AWS credentials file name.
pub const AWS_CREDENTIALS_FILE: &str = "aws-credentials.yaml";

/// Google credentials file name.
pub const GOOGLE_CREDENTIALS_FILE: &str = "google-credentials.yaml";

/// Execution role used when the credentials file names none.
pub const DEFAULT_AWS_ROLE: &str = "LabRole";

/// AWS access key and execution role.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct AwsCredentials {
    /// Access key id.
    #[serde(default)]
    pub aws_access_key_id: String,
    /// Secret access key.
    #[serde(default)]
    pub aws_secret_access_key: String,
    /// Session token for temporary credentials.
    #[serde(default)]
    pub aws_session_token: Option<String>,
    /// IAM role name functions execute as.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    DEFAULT_AWS_ROLE.to_string()
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .field(
                "aws_session_token",
                &self.aws_session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("role", &self.role)
            .finish()
    }
}

impl AwsCredentials {
    /// Overrides file values with `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// `AWS_SESSION_TOKEN` and `FNDEPLOY_AWS_ROLE`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("AWS_ACCESS_KEY_ID") {
            self.aws_access_key_id = value;
        }
        if let Some(value) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.aws_secret_access_key = value;
        }
        if let Some(value) = lookup("AWS_SESSION_TOKEN") {
            self.aws_session_token = Some(value);
        }
        if let Some(value) = lookup("FNDEPLOY_AWS_ROLE") {
            self.role = value;
        }
    }

    fn check(&self) -> Result<()> {
        if self.aws_access_key_id.is_empty() || self.aws_secret_access_key.is_empty() {
            return Err(ConfigError::missing_credentials(
                Provider::Aws,
                "aws_access_key_id and aws_secret_access_key are required",
            )
            .into());
        }
        Ok(())
    }
}

/// Google service-account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct GoogleCredentials {
    /// Raw service-account JSON, handed to the token generator.
    pub service_account_json: String,
    /// Project the service account belongs to.
    pub project_id: String,
}

impl fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("service_account_json", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl GoogleCredentials {
    /// Parses a service-account key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a mapping with a `project_id`.
    pub fn from_service_account(content: &str, source: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct ServiceAccount {
            #[serde(default)]
            project_id: String,
        }

        let account: ServiceAccount = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse(format!("Invalid service account: {e}"), source))?;

        if account.project_id.is_empty() {
            return Err(
                ConfigError::missing_credentials(Provider::Google, "project_id is required").into(),
            );
        }

        Ok(Self {
            service_account_json: content.to_string(),
            project_id: account.project_id,
        })
    }
}

/// Credentials of every provider a deployment touches.
#[derive(Debug, Clone, Default)]
pub struct CredentialsHolder {
    /// AWS credentials, if AWS is referenced.
    pub aws: Option<AwsCredentials>,
    /// Google credentials, if Google is referenced.
    pub google: Option<GoogleCredentials>,
}

impl CredentialsHolder {
    /// Loads credentials for the given providers from `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required credentials file is missing or invalid.
    pub fn load(base_dir: &Path, providers: &BTreeSet<Provider>) -> Result<Self> {
        let mut holder = Self::default();

        for provider in providers {
            match provider {
                Provider::Aws => {
                    let path = base_dir.join(AWS_CREDENTIALS_FILE);
                    let mut credentials = if path.exists() {
                        let content = read_file(&path)?;
                        serde_yaml::from_str::<AwsCredentials>(&content).map_err(|e| {
                            ConfigError::parse(e.to_string(), path.display().to_string())
                        })?
                    } else {
                        debug!("{} not found, relying on environment", path.display());
                        AwsCredentials {
                            aws_access_key_id: String::new(),
                            aws_secret_access_key: String::new(),
                            aws_session_token: None,
                            role: default_role(),
                        }
                    };
                    credentials.apply_env_overrides();
                    credentials.check()?;
                    info!("Loaded AWS credentials (role {})", credentials.role);
                    holder.aws = Some(credentials);
                }
                Provider::Google => {
                    let path = base_dir.join(GOOGLE_CREDENTIALS_FILE);
                    if !path.exists() {
                        return Err(ConfigError::FileNotFound { path }.into());
                    }
                    let content = read_file(&path)?;
                    let credentials =
                        GoogleCredentials::from_service_account(&content, &path.display().to_string())?;
                    info!("Loaded Google credentials (project {})", credentials.project_id);
                    holder.google = Some(credentials);
                }
            }
        }

        Ok(holder)
    }

    /// Returns the AWS credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if AWS credentials were not loaded.
    pub fn aws(&self) -> Result<&AwsCredentials> {
        self.aws.as_ref().ok_or_else(|| {
            ConfigError::missing_credentials(Provider::Aws, "credentials were not loaded").into()
        })
    }

    /// Returns the Google credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if Google credentials were not loaded.
    pub fn google(&self) -> Result<&GoogleCredentials> {
        self.google.as_ref().ok_or_else(|| {
            ConfigError::missing_credentials(Provider::Google, "credentials were not loaded")
                .into()
        })
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    const SERVICE_ACCOUNT: &str = r#"{
  "type": "service_account",
  "project_id": "demo-project",
  "private_key_id": "abc",
  "client_email": "deployer@demo-project.iam.gserviceaccount.com"
}"#;

    #[test]
    fn test_load_google_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GOOGLE_CREDENTIALS_FILE), SERVICE_ACCOUNT).unwrap();

        let providers = BTreeSet::from([Provider::Google]);
        let holder = CredentialsHolder::load(dir.path(), &providers).unwrap();

        assert!(holder.aws.is_none());
        let google = holder.google().unwrap();
        assert_eq!(google.project_id, "demo-project");
        assert_eq!(google.service_account_json, SERVICE_ACCOUNT);
    }

    #[test]
    fn test_missing_google_file() {
        let dir = tempfile::tempdir().unwrap();
        let providers = BTreeSet::from([Provider::Google]);
        let result = CredentialsHolder::load(dir.path(), &providers);
        assert!(matches!(
            result,
            Err(DeployError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_unreferenced_provider_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let holder = CredentialsHolder::load(dir.path(), &BTreeSet::new()).unwrap();
        assert!(holder.aws().is_err());
        assert!(holder.google().is_err());
    }

    #[test]
    fn test_aws_file_defaults_role() {
        let credentials: AwsCredentials = serde_yaml::from_str(
            "aws_access_key_id: AKIA\naws_secret_access_key: secret\n",
        )
        .unwrap();
        assert_eq!(credentials.role, DEFAULT_AWS_ROLE);
        assert!(credentials.aws_session_token.is_none());
        assert!(credentials.check().is_ok());
    }

    #[test]
    fn test_aws_overrides() {
        let mut credentials: AwsCredentials =
            serde_yaml::from_str("aws_access_key_id: file-key\nrole: FileRole\n").unwrap();
        assert!(credentials.check().is_err());

        credentials.apply_overrides(|key| match key {
            "AWS_SECRET_ACCESS_KEY" => Some(String::from("env-secret")),
            "FNDEPLOY_AWS_ROLE" => Some(String::from("EnvRole")),
            _ => None,
        });

        assert_eq!(credentials.aws_access_key_id, "file-key");
        assert_eq!(credentials.aws_secret_access_key, "env-secret");
        assert_eq!(credentials.role, "EnvRole");
        assert!(credentials.check().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = AwsCredentials {
            aws_access_key_id: String::from("AKIA"),
            aws_secret_access_key: String::from("very-secret"),
            aws_session_token: Some(String::from("token")),
            role: default_role(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("token\""));
    }
}
