//! Deployment plan construction.
//!
//! This module expands deployment specs into the flat list of targets a run
//! deploys, one per (function, provider binding, region).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DeploymentSpec;
use crate::error::{ConfigError, Result};
use crate::provider::Provider;

use super::target::DeploymentTarget;
use super::validator::TargetValidator;

/// A complete deployment plan.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Targets in spec, binding, region order.
    pub targets: Vec<DeploymentTarget>,
}

/// Expands deployment specs into flat targets.
#[derive(Debug, Default)]
pub struct Planner {
    validator: TargetValidator,
}

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            validator: TargetValidator::new(),
        }
    }

    /// Builds the deployment plan for the given specs.
    ///
    /// Fails without producing any target if a handler reference is malformed
    /// or any target is invalid.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed handler references and a
    /// validation error for targets with missing or invalid fields.
    pub fn plan(&self, specs: &[DeploymentSpec]) -> Result<DeploymentPlan> {
        let mut targets = Vec::new();

        for spec in specs {
            for binding in &spec.providers {
                let (file, entry_point) = split_handler(&spec.name, &binding.handler)?;

                if binding.regions.is_empty() {
                    self.validator.validate(spec, binding, (file, entry_point), "")?;
                }

                for region in &binding.regions {
                    self.validator
                        .validate(spec, binding, (file, entry_point), region)?;

                    let Some(provider) = binding.provider() else {
                        continue;
                    };

                    debug!("Planned {} for {provider} in {region}", spec.name);
                    targets.push(DeploymentTarget {
                        archive: spec.archive.trim().to_string(),
                        name: spec.name.clone(),
                        memory_mb: spec.memory_mb,
                        timeout_secs: spec.timeout_secs,
                        runtime: binding.runtime.clone(),
                        provider,
                        handler_file: file.to_string(),
                        handler_entry_point: entry_point.to_string(),
                        region: region.clone(),
                        staged: None,
                    });
                }
            }
        }

        info!("Planned {} deployment target(s)", targets.len());

        Ok(DeploymentPlan {
            created_at: Utc::now(),
            targets,
        })
    }
}

/// Splits `<file>.<entry-point>` into its two components.
fn split_handler<'a>(function: &str, handler: &'a str) -> Result<(&'a str, &'a str)> {
    let mut parts = handler.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(file), Some(entry_point), None) => Ok((file, entry_point)),
        _ => Err(ConfigError::InvalidHandler {
            function: function.to_string(),
            handler: handler.to_string(),
        }
        .into()),
    }
}

impl DeploymentPlan {
    /// Returns true if the plan has no targets.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns the number of targets.
    #[must_use]
    pub const fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Returns the number of targets for a provider.
    #[must_use]
    pub fn provider_count(&self, provider: Provider) -> usize {
        self.targets
            .iter()
            .filter(|t| t.provider == provider)
            .count()
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.targets.is_empty() {
            return write!(f, "No deployment targets");
        }

        writeln!(f, "Deployment Plan ({} targets):", self.targets.len())?;
        for (i, target) in self.targets.iter().enumerate() {
            writeln!(f, "  {i}. {target}")?;
        }

        Ok(())
    }
}
