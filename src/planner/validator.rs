//! Target validation.
//!
//! Every flat target must carry an archive, a name, a positive memory size, a
//! runtime, a known provider, both handler components and a region. Checks run
//! before a target is built, so a [`DeploymentTarget`] that exists is valid.
//!
//! [`DeploymentTarget`]: super::DeploymentTarget

use tracing::debug;

use crate::config::{DeploymentSpec, ProviderBinding};
use crate::error::ValidationError;

/// Field names reported for invalid targets.
pub mod field {
    /// Archive source.
    pub const ARCHIVE: &str = "Archive";
    /// Function name.
    pub const NAME: &str = "Name";
    /// Memory size.
    pub const MEMORY_SIZE: &str = "MemorySize";
    /// Runtime.
    pub const RUNTIME: &str = "Runtime";
    /// Provider name.
    pub const PROVIDER: &str = "Provider";
    /// File component of the handler.
    pub const HANDLER_FILE: &str = "HandlerFile";
    /// Entry-point component of the handler.
    pub const HANDLER_FUNCTION: &str = "HandlerFunction";
    /// Region.
    pub const REGIONS: &str = "Regions";
}

/// Validator for flat deployment targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetValidator;

impl TargetValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates the fields a target for `region` would be built from.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every missing or invalid field.
    pub fn validate(
        &self,
        spec: &DeploymentSpec,
        binding: &ProviderBinding,
        handler: (&str, &str),
        region: &str,
    ) -> Result<(), ValidationError> {
        let mut fields = Vec::new();

        if spec.archive.trim().is_empty() {
            fields.push(field::ARCHIVE);
        }
        if spec.name.trim().is_empty() {
            fields.push(field::NAME);
        }
        if spec.memory_mb == 0 {
            fields.push(field::MEMORY_SIZE);
        }
        if binding.runtime.trim().is_empty() {
            fields.push(field::RUNTIME);
        }
        if binding.provider().is_none() {
            fields.push(field::PROVIDER);
        }
        if handler.0.is_empty() {
            fields.push(field::HANDLER_FILE);
        }
        if handler.1.is_empty() {
            fields.push(field::HANDLER_FUNCTION);
        }
        if region.trim().is_empty() {
            fields.push(field::REGIONS);
        }

        if fields.is_empty() {
            return Ok(());
        }

        debug!("Target {} in '{region}' is missing {fields:?}", spec.name);
        Err(ValidationError {
            function: spec.name.clone(),
            fields: fields.into_iter().map(String::from).collect(),
        })
    }
}
