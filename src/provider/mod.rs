//! Cloud provider integration module.
//!
//! This module defines the provider-neutral seams the engine is built on:
//! the closed [`Provider`] enum (mapped one-to-one onto storage URI schemes),
//! provider-native [`ArchiveReference`]s, and the [`ObjectStore`] and
//! [`FunctionClient`] traits implemented once per provider.

pub mod aws;
pub mod google;
mod factory;
mod stream;
#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};
use crate::planner::DeploymentTarget;

pub use factory::CloudClients;
pub use stream::{ArchiveChunks, ArchiveStream};

/// Prefix of every deployment bucket created by fndeploy.
pub const ARCHIVE_BUCKET_PREFIX: &str = "godeploy-deployments";

/// A supported function-as-a-service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// AWS Lambda with S3 object storage.
    Aws,
    /// Google Cloud Functions with Cloud Storage.
    Google,
}

impl Provider {
    /// All supported providers.
    pub const ALL: [Self; 2] = [Self::Aws, Self::Google];

    /// URI scheme of the provider's object store.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Aws => "s3",
            Self::Google => "gs",
        }
    }

    /// Region that needs no explicit location constraint.
    #[must_use]
    pub const fn default_region(self) -> &'static str {
        match self {
            Self::Aws => "us-east-1",
            Self::Google => "us-east1",
        }
    }

    /// Returns the provider whose object store a URI points at, if any.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| uri.starts_with(&format!("{}://", p.scheme())))
    }

    /// Builds the handler string the provider expects for a function.
    ///
    /// Lambda takes `<file>.<entry-point>` for runtimes resolving handlers
    /// that way (python) and the bare file component otherwise. Cloud
    /// Functions addresses the entry point directly.
    #[must_use]
    pub fn handler(self, file: &str, entry_point: &str, runtime: &str) -> String {
        match self {
            Self::Aws if runtime.contains("python") => format!("{file}.{entry_point}"),
            Self::Aws => file.to_string(),
            Self::Google => entry_point.to_string(),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => write!(f, "AWS"),
            Self::Google => write!(f, "Google"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "google" | "gcp" => Ok(Self::Google),
            other => Err(format!("Unknown provider: {other}. Expected: AWS or Google")),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.to_string()
    }
}

/// A staged object in a provider's store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArchiveReference {
    /// Provider owning the object store.
    pub provider: Provider,
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl ArchiveReference {
    /// Creates a new archive reference.
    #[must_use]
    pub fn new(provider: Provider, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            provider,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parses a `s3://bucket/key` or `gs://bucket/key` URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is unknown or bucket or key is empty.
    pub fn parse(uri: &str) -> std::result::Result<Self, TransferError> {
        let invalid = || TransferError::InvalidUri {
            uri: uri.to_string(),
        };

        let provider = Provider::from_uri(uri).ok_or_else(invalid)?;
        let rest = &uri[provider.scheme().len() + 3..];
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;

        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(provider, bucket, key))
    }

    /// Returns the URI form of the reference.
    #[must_use]
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArchiveReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.provider.scheme(), self.bucket, self.key)
    }
}

/// Where a deployment archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// An object already held in a provider's store.
    Remote(ArchiveReference),
    /// A file on the local filesystem.
    Local(PathBuf),
}

impl ArchiveSource {
    /// Classifies an archive location by its URI scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage URI is malformed.
    pub fn parse(archive: &str) -> std::result::Result<Self, TransferError> {
        if Provider::from_uri(archive).is_some() {
            ArchiveReference::parse(archive).map(Self::Remote)
        } else {
            Ok(Self::Local(PathBuf::from(archive)))
        }
    }

    /// Returns the provider holding the archive, if it is remote.
    #[must_use]
    pub const fn provider(&self) -> Option<Provider> {
        match self {
            Self::Remote(reference) => Some(reference.provider),
            Self::Local(_) => None,
        }
    }
}

/// Everything a provider needs to create or update one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// Region the function lives in.
    pub region: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Memory in MB.
    pub memory_mb: u32,
    /// Timeout in seconds, zero for the provider default.
    pub timeout_secs: u32,
    /// Provider-specific handler string.
    pub handler: String,
    /// Entry point component of the handler.
    pub entry_point: String,
    /// Staged archive holding the function code.
    pub archive: ArchiveReference,
    /// Execution role, where the provider uses one.
    pub role: Option<String>,
}

impl FunctionDefinition {
    /// Builds the definition for a staged target.
    #[must_use]
    pub fn for_target(
        target: &DeploymentTarget,
        archive: &ArchiveReference,
        role: Option<&str>,
    ) -> Self {
        Self {
            name: target.name.clone(),
            region: target.region.clone(),
            runtime: target.runtime.clone(),
            memory_mb: target.memory_mb,
            timeout_secs: target.timeout_secs,
            handler: target.provider.handler(
                &target.handler_file,
                &target.handler_entry_point,
                &target.runtime,
            ),
            entry_point: target.handler_entry_point.clone(),
            archive: archive.clone(),
            role: role.map(str::to_string),
        }
    }
}

/// A provider's object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Provider owning this store.
    fn provider(&self) -> Provider;

    /// Lists the names of all buckets of the account or project.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Checks whether a bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Creates a bucket, optionally pinned to a location.
    ///
    /// Creating a bucket the caller already owns succeeds.
    async fn create_bucket(&self, bucket: &str, location: Option<&str>) -> Result<()>;

    /// Opens an object for streaming.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ArchiveStream>;

    /// Writes an object from a stream.
    async fn put_object(&self, bucket: &str, key: &str, body: ArchiveStream) -> Result<()>;
}

/// A provider's function-management API.
///
/// Conflicts are reported through dedicated errors:
/// [`crate::error::ProviderError::AlreadyExists`] from `create_function` and
/// [`crate::error::ProviderError::UpdateInProgress`] from
/// `update_function_code`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FunctionClient: Send + Sync {
    /// Creates a function and returns its identifier.
    async fn create_function(&self, function: &FunctionDefinition) -> Result<String>;

    /// Updates memory, timeout, runtime, role and handler of a function.
    async fn update_function_config(&self, function: &FunctionDefinition) -> Result<()>;

    /// Points a function at new code and returns its identifier.
    async fn update_function_code(&self, function: &FunctionDefinition) -> Result<String>;

    /// Lists the identifiers of deployed functions.
    async fn list_functions(&self) -> Result<Vec<String>>;
}
