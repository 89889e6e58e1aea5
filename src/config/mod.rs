//! Configuration module for fndeploy.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `deployment.yaml`
//! - Loading `.env` files next to the deployment file
//! - Loading provider credentials for referenced providers

mod credentials;
mod parser;
mod spec;

pub use credentials::{
    AWS_CREDENTIALS_FILE, AwsCredentials, CredentialsHolder, DEFAULT_AWS_ROLE,
    GOOGLE_CREDENTIALS_FILE, GoogleCredentials,
};
pub use parser::{ConfigParser, DEFAULT_DEPLOYMENT_FILE};
pub use spec::{DeploymentFile, DeploymentSpec, ProviderBinding};
