//! Deployment file types.
//!
//! This module defines the structs that map to `deployment.yaml`. A file holds
//! one entry per logical function, each bound to one or more providers and
//! regions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::provider::Provider;

/// The root of a deployment file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentFile {
    /// Functions to deploy.
    #[serde(default)]
    pub functions: Vec<DeploymentSpec>,
}

/// Desired state of one logical function.
///
/// Missing scalar fields default to empty or zero so that they surface as
/// validation failures of the planned targets rather than parse errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentSpec {
    /// Local path or `s3://` / `gs://` URI of the function archive.
    #[serde(default)]
    pub archive: String,
    /// Function name.
    #[serde(default)]
    pub name: String,
    /// Memory in MB.
    #[serde(default, rename = "memory")]
    pub memory_mb: u32,
    /// Timeout in seconds.
    #[serde(default, rename = "timeout")]
    pub timeout_secs: u32,
    /// Providers to deploy to.
    #[serde(default)]
    pub providers: Vec<ProviderBinding>,
}

/// Deployment of a function to one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderBinding {
    /// Provider name (`AWS` or `Google`, case-insensitive).
    #[serde(default)]
    pub name: String,
    /// Handler reference in `<file>.<entry-point>` form.
    #[serde(default)]
    pub handler: String,
    /// Runtime identifier.
    #[serde(default)]
    pub runtime: String,
    /// Regions to deploy to.
    #[serde(default)]
    pub regions: Vec<String>,
}

impl DeploymentFile {
    /// Returns the providers whose credentials a deployment needs.
    ///
    /// Includes providers only referenced through an archive URI, since
    /// copying such an archive reads from that provider's store.
    #[must_use]
    pub fn required_providers(&self) -> BTreeSet<Provider> {
        self.functions
            .iter()
            .flat_map(DeploymentSpec::required_providers)
            .collect()
    }

    /// Returns the number of flat targets the file expands to.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.functions.iter().map(DeploymentSpec::target_count).sum()
    }
}

impl DeploymentSpec {
    /// Returns the providers this function touches.
    #[must_use]
    pub fn required_providers(&self) -> BTreeSet<Provider> {
        let mut providers: BTreeSet<Provider> = self
            .providers
            .iter()
            .filter_map(ProviderBinding::provider)
            .collect();
        if let Some(source) = Provider::from_uri(&self.archive) {
            providers.insert(source);
        }
        providers
    }

    /// Returns the number of (provider, region) pairs of this function.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.providers.iter().map(|p| p.regions.len()).sum()
    }
}

impl ProviderBinding {
    /// Returns the parsed provider, or `None` for an unknown name.
    #[must_use]
    pub fn provider(&self) -> Option<Provider> {
        self.name.parse().ok()
    }
}
