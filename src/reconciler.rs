//! Reconciler for deployed functions.
//!
//! This module converges a remote function onto a staged target: it creates
//! the function, and when the provider reports that it already exists, updates
//! its configuration and then its code. Code updates that collide with an
//! update still in progress are retried a bounded number of times.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::planner::DeploymentTarget;
use crate::provider::{ArchiveReference, FunctionClient, FunctionDefinition};

/// Retries of a conflicting code update after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Fixed delay between code update attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How a function was brought to the desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    /// The function did not exist and was created.
    Created,
    /// The function existed and was updated.
    Updated,
}

impl std::fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Result of reconciling one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Provider-assigned identifier (ARN or resource name).
    pub function_id: String,
    /// What was done.
    pub action: ReconcileAction,
}

/// Creates or updates functions.
#[derive(Debug, Clone)]
pub struct FunctionReconciler {
    /// Retries of a conflicting code update.
    max_retries: u32,
    /// Delay between code update attempts.
    retry_delay: Duration,
}

impl Default for FunctionReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionReconciler {
    /// Creates a reconciler with the default retry policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the number of code update retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay between code update attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Brings the target's function to the desired state.
    ///
    /// # Errors
    ///
    /// Returns the provider error of a failed create or config update, or
    /// [`ReconcileError::RetriesExhausted`] when the code update keeps
    /// conflicting.
    pub async fn reconcile(
        &self,
        client: &dyn FunctionClient,
        target: &DeploymentTarget,
        archive: &ArchiveReference,
        role: Option<&str>,
    ) -> Result<Reconciliation> {
        let function = FunctionDefinition::for_target(target, archive, role);

        match client.create_function(&function).await {
            Ok(function_id) => {
                info!("{}: created {} in {}", target.provider, target.name, target.region);
                Ok(Reconciliation {
                    function_id,
                    action: ReconcileAction::Created,
                })
            }
            Err(err) if err.is_already_exists() => {
                debug!("{}: {} exists, updating", target.provider, target.name);
                client.update_function_config(&function).await?;
                let function_id = self.update_code(client, &function).await?;
                info!("{}: updated {} in {}", target.provider, target.name, target.region);
                Ok(Reconciliation {
                    function_id,
                    action: ReconcileAction::Updated,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Updates function code, retrying while another update is in progress.
    async fn update_code(
        &self,
        client: &dyn FunctionClient,
        function: &FunctionDefinition,
    ) -> Result<String> {
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match client.update_function_code(function).await {
                Ok(function_id) => return Ok(function_id),
                Err(err) if err.is_update_in_progress() => {
                    if attempt < attempts {
                        warn!(
                            "Update of {} in progress, retrying ({attempt}/{})",
                            function.name, self.max_retries
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(ReconcileError::RetriesExhausted {
            attempts,
            function: function.name.clone(),
            region: function.region.clone(),
        }
        .into())
    }
}
