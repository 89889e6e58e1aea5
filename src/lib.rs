// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # fndeploy
//!
//! Concurrent multi-cloud, multi-region deployment of serverless function
//! archives to AWS Lambda and Google Cloud Functions.
//!
//! ## Overview
//!
//! A deployment file lists logical functions, each with an archive and one or
//! more provider bindings. fndeploy expands them into flat
//! (function, provider, region) targets and deploys every target
//! concurrently:
//!
//! - Archives are staged into a per-region deployment bucket, copied across
//!   providers when the source lives in the other provider's store
//! - Functions are created, or updated in place when they already exist
//! - Code updates that collide with an in-flight update are retried
//!
//! ## Architecture
//!
//! 1. **Planner**: expands specs into validated deployment targets
//! 2. **Stager**: resolves buckets and places archives, sharing work across
//!    concurrent targets through keyed once-caches
//! 3. **Reconciler**: applies create-or-update semantics per target
//! 4. **Orchestrator**: fans targets out onto tasks and collects outcomes
//!
//! ## Modules
//!
//! - [`config`]: Deployment file and credential loading
//! - [`planner`]: Target expansion and validation
//! - [`stager`]: Archive staging and shared caches
//! - [`provider`]: AWS and Google object-store and function clients
//! - [`reconciler`]: Create-or-update of a single function
//! - [`orchestrator`]: Concurrent deployment runs
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! functions:
//!   - name: hello
//!     archive: ./build/hello.zip
//!     memory: 256
//!     timeout: 30
//!     providers:
//!       - name: AWS
//!         handler: main.handler
//!         runtime: python3.12
//!         regions: [us-east-1, eu-central-1]
//!       - name: Google
//!         handler: main.handler
//!         runtime: python312
//!         regions: [europe-west3]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod stager;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, CredentialsHolder, DeploymentFile, DeploymentSpec, ProviderBinding};
pub use error::{DeployError, Result};
pub use orchestrator::{ClientFactory, DeployReport, Orchestrator, TargetOutcome, deploy};
pub use planner::{DeploymentPlan, DeploymentTarget, Planner};
pub use provider::{ArchiveReference, CloudClients, FunctionClient, ObjectStore, Provider};
pub use reconciler::{FunctionReconciler, ReconcileAction, Reconciliation};
pub use stager::{ArchiveStager, KeyedOnce};
