//! Flat deployment targets.

use serde::Serialize;
use std::fmt;

use crate::provider::{ArchiveReference, Provider};

/// One concrete (function, provider, region) unit to create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentTarget {
    /// Archive source as written in the deployment file.
    pub archive: String,
    /// Function name.
    pub name: String,
    /// Memory in MB.
    pub memory_mb: u32,
    /// Timeout in seconds.
    pub timeout_secs: u32,
    /// Runtime identifier.
    pub runtime: String,
    /// Provider to deploy to.
    pub provider: Provider,
    /// File component of the handler reference.
    pub handler_file: String,
    /// Entry-point component of the handler reference.
    pub handler_entry_point: String,
    /// Region to deploy to.
    pub region: String,
    /// Staged archive, filled in by the stager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<ArchiveReference>,
}

impl DeploymentTarget {
    /// Returns the handler string the target's provider expects.
    #[must_use]
    pub fn provider_handler(&self) -> String {
        self.provider
            .handler(&self.handler_file, &self.handler_entry_point, &self.runtime)
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.provider, self.region)
    }
}
