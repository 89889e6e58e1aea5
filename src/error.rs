//! Error types for the fndeploy deployment engine.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration loading, target validation, archive transfer, provider API
//! calls, and function reconciliation.

use std::path::PathBuf;
use thiserror::Error;

use crate::provider::Provider;

/// The main error type for the deployment engine.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A flat deployment target failed validation.
    #[error("Deployment check failed: {0}")]
    Validation(#[from] ValidationError),

    /// Archive transfer errors.
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Provider API errors.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The deployment or credentials file was not found.
    #[error("Unable to find file: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A file could not be parsed.
    #[error("Unable to parse {location}: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// File or source that failed to parse.
        location: String,
    },

    /// A handler reference did not split into `<file>.<entry-point>`.
    #[error("Unable to parse function handler '{handler}' of function '{function}'")]
    InvalidHandler {
        /// The function the handler belongs to.
        function: String,
        /// The offending handler reference.
        handler: String,
    },

    /// Credentials for a referenced provider are missing or incomplete.
    #[error("Missing {provider} credentials: {message}")]
    MissingCredentials {
        /// Provider whose credentials are missing.
        provider: Provider,
        /// What is missing.
        message: String,
    },
}

/// A deployment target failed the invariant set.
#[derive(Debug, Error)]
#[error("unable to parse keys of deployment '{function}', {fields:?}")]
pub struct ValidationError {
    /// Name of the function (may be empty when the name itself is missing).
    pub function: String,
    /// The fields that are missing or invalid.
    pub fields: Vec<String>,
}

/// Archive transfer errors.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A local archive could not be read.
    #[error("Unable to read archive {path}: {source}")]
    ReadArchive {
        /// Path of the local archive.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A storage URI could not be split into bucket and key.
    #[error("Unable to parse storage object URI '{uri}'")]
    InvalidUri {
        /// The offending URI.
        uri: String,
    },

    /// The archive source cannot be staged for the requested provider.
    #[error("Unable to stage archive '{archive}': {message}")]
    Unsupported {
        /// The archive source.
        archive: String,
        /// Why it cannot be staged.
        message: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The function already exists (create conflict).
    #[error("{provider}: function '{function}' already exists")]
    AlreadyExists {
        /// Provider that reported the conflict.
        provider: Provider,
        /// Function name.
        function: String,
    },

    /// Another update of the function is still in progress.
    #[error("{provider}: an update is in progress for function '{function}'")]
    UpdateInProgress {
        /// Provider that reported the conflict.
        provider: Provider,
        /// Function name.
        function: String,
    },

    /// Authentication with the provider failed.
    #[error("{provider}: authentication failed: {message}")]
    Auth {
        /// Provider.
        provider: Provider,
        /// Description of the failure.
        message: String,
    },

    /// A long-running operation finished with an error.
    #[error("{provider}: operation {operation} failed: {message}")]
    OperationFailed {
        /// Provider.
        provider: Provider,
        /// Operation name.
        operation: String,
        /// Error reported by the operation.
        message: String,
    },

    /// Any other API failure.
    #[error("{provider}: unable to {operation}: {message}")]
    Api {
        /// Provider.
        provider: Provider,
        /// What was being attempted.
        operation: String,
        /// Error message from the API.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The code update kept conflicting with an in-progress update.
    #[error("Maximum retry attempts ({attempts}) exceeded updating code of '{function}' in {region}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Function name.
        function: String,
        /// Region of the function.
        region: String,
    },
}

/// Result type alias for fndeploy operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error is the "function already exists" conflict.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::AlreadyExists { .. }))
    }

    /// Returns true if the error is the transient "update in progress" conflict.
    #[must_use]
    pub const fn is_update_in_progress(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::UpdateInProgress { .. }))
    }
}

impl ConfigError {
    /// Creates a parse error for the given location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: location.into(),
        }
    }

    /// Creates a missing-credentials error.
    #[must_use]
    pub fn missing_credentials(provider: Provider, message: impl Into<String>) -> Self {
        Self::MissingCredentials {
            provider,
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a generic API error.
    #[must_use]
    pub fn api(
        provider: Provider,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            provider,
            operation: operation.into(),
            message: message.into(),
        }
    }
}
