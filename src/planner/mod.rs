//! Planning module for deployment runs.
//!
//! This module expands deployment specs into flat, validated
//! per-provider, per-region deployment targets.

mod plan;
mod target;
mod validator;

pub use plan::{DeploymentPlan, Planner};
pub use target::DeploymentTarget;
pub use validator::{TargetValidator, field};
