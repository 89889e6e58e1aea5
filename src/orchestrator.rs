//! Concurrent deployment orchestration.
//!
//! The [`Orchestrator`] plans a run, then spawns one task per flat target on a
//! [`JoinSet`]. Each task stages the target's archive and reconciles its
//! function. By default the first failure ends the run and the remaining
//! tasks are aborted; with `continue_on_error` every task runs to completion
//! and failures are collected in the [`DeployReport`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{CredentialsHolder, DeploymentSpec};
use crate::error::{DeployError, Result};
use crate::planner::{DeploymentPlan, DeploymentTarget, Planner};
use crate::provider::{ArchiveSource, CloudClients, FunctionClient, ObjectStore, Provider};
use crate::reconciler::{FunctionReconciler, ReconcileAction, Reconciliation};
use crate::stager::ArchiveStager;

/// Builds provider clients for deployment tasks.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Returns the object store of a provider in a region.
    async fn object_store(&self, provider: Provider, region: &str) -> Result<Arc<dyn ObjectStore>>;

    /// Returns the function client of a provider in a region.
    async fn function_client(
        &self,
        provider: Provider,
        region: &str,
    ) -> Result<Arc<dyn FunctionClient>>;

    /// Returns the execution role functions of a provider run as, if any.
    async fn execution_role(&self, provider: Provider) -> Result<Option<String>>;
}

/// Outcome of one deployment target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    /// Function name.
    pub name: String,
    /// Provider.
    pub provider: Provider,
    /// Region.
    pub region: String,
    /// Staged archive URI, if staging finished.
    pub archive: Option<String>,
    /// Deployed function identifier.
    pub function_id: Option<String>,
    /// Whether the function was created or updated.
    pub action: Option<ReconcileAction>,
    /// Time spent on the target in milliseconds.
    pub elapsed_ms: u64,
    /// Error message, if the target failed.
    pub error: Option<String>,
}

impl TargetOutcome {
    fn new(target: &DeploymentTarget, result: &Result<Reconciliation>, elapsed: Duration) -> Self {
        let (function_id, action, error) = match result {
            Ok(reconciliation) => (
                Some(reconciliation.function_id.clone()),
                Some(reconciliation.action),
                None,
            ),
            Err(err) => (None, None, Some(err.to_string())),
        };

        Self {
            name: target.name.clone(),
            provider: target.provider,
            region: target.region.clone(),
            archive: target.staged.as_ref().map(ToString::to_string),
            function_id,
            action,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error,
        }
    }

    /// Returns true if the target was deployed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a deployment run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last target finished.
    pub finished_at: DateTime<Utc>,
    /// Per-target outcomes in plan order.
    pub outcomes: Vec<TargetOutcome>,
}

impl DeployReport {
    /// Returns the number of deployed targets.
    #[must_use]
    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Returns the number of failed targets.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.successful()
    }

    /// Returns true if every target was deployed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TargetOutcome::is_success)
    }
}

impl std::fmt::Display for DeployReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Deployed {}/{} target(s)",
            self.successful(),
            self.outcomes.len()
        )?;
        for outcome in &self.outcomes {
            match (&outcome.function_id, &outcome.error) {
                (Some(id), _) => writeln!(f, "  ok   {} {} {id}", outcome.provider, outcome.region)?,
                (None, Some(err)) => {
                    writeln!(f, "  FAIL {} {} {}: {err}", outcome.provider, outcome.region, outcome.name)?;
                }
                (None, None) => {}
            }
        }
        Ok(())
    }
}

/// Runs deployment plans concurrently.
#[derive(Debug)]
pub struct Orchestrator<F> {
    factory: Arc<F>,
    planner: Planner,
    stager: Arc<ArchiveStager>,
    reconciler: FunctionReconciler,
    continue_on_error: bool,
}

impl<F: ClientFactory + 'static> Orchestrator<F> {
    /// Creates an orchestrator over a client factory.
    #[must_use]
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            planner: Planner::new(),
            stager: Arc::new(ArchiveStager::new()),
            reconciler: FunctionReconciler::new(),
            continue_on_error: false,
        }
    }

    /// Sets whether to keep deploying other targets after a failure.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Replaces the function reconciler.
    #[must_use]
    pub const fn with_reconciler(mut self, reconciler: FunctionReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Plans and deploys every target of `specs`.
    ///
    /// # Errors
    ///
    /// Returns a configuration or validation error before any target starts,
    /// or the first target failure unless `continue_on_error` is set.
    pub async fn deploy(&self, specs: &[DeploymentSpec]) -> Result<DeployReport> {
        let plan = self.planner.plan(specs)?;
        self.execute(plan).await
    }

    /// Deploys every target of a plan concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first target failure unless `continue_on_error` is set.
    pub async fn execute(&self, plan: DeploymentPlan) -> Result<DeployReport> {
        let started_at = Utc::now();
        info!("Deploying {} target(s)", plan.target_count());

        let mut tasks = JoinSet::new();
        for (index, mut target) in plan.targets.into_iter().enumerate() {
            let factory = Arc::clone(&self.factory);
            let stager = Arc::clone(&self.stager);
            let reconciler = self.reconciler.clone();

            tasks.spawn(async move {
                let started = Instant::now();
                let result = deploy_target(factory.as_ref(), &stager, &reconciler, &mut target).await;
                let outcome = TargetOutcome::new(&target, &result, started.elapsed());
                (index, outcome, result)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome, result) = joined
                .map_err(|e| DeployError::internal(format!("Deployment task failed: {e}")))?;

            match result {
                Ok(_) => info!(
                    "{}: {} {} in {}",
                    outcome.provider,
                    outcome.action.map_or_else(String::new, |a| a.to_string()),
                    outcome.name,
                    outcome.region
                ),
                Err(err) if !self.continue_on_error => {
                    error!(
                        "{}: deploying {} to {} failed: {err}",
                        outcome.provider, outcome.name, outcome.region
                    );
                    return Err(err);
                }
                Err(err) => warn!(
                    "{}: deploying {} to {} failed: {err}",
                    outcome.provider, outcome.name, outcome.region
                ),
            }

            outcomes.push((index, outcome));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        let report = DeployReport {
            started_at,
            finished_at: Utc::now(),
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        };

        info!(
            "Deployment finished: {} succeeded, {} failed",
            report.successful(),
            report.failed()
        );
        Ok(report)
    }
}

/// Stages and reconciles one target.
async fn deploy_target<F: ClientFactory>(
    factory: &F,
    stager: &ArchiveStager,
    reconciler: &FunctionReconciler,
    target: &mut DeploymentTarget,
) -> Result<Reconciliation> {
    let destination = factory.object_store(target.provider, &target.region).await?;

    let source = match ArchiveSource::parse(&target.archive)?.provider() {
        Some(provider) if provider != target.provider => {
            Some(factory.object_store(provider, provider.default_region()).await?)
        }
        _ => None,
    };

    let archive = stager
        .stage(target, destination.as_ref(), source.as_deref())
        .await?;

    let client = factory.function_client(target.provider, &target.region).await?;
    let role = factory.execution_role(target.provider).await?;

    reconciler
        .reconcile(client.as_ref(), target, &archive, role.as_deref())
        .await
}

/// Deploys `specs` with clients built from `credentials`.
///
/// # Errors
///
/// Returns the first configuration, validation or target error.
pub async fn deploy(
    specs: &[DeploymentSpec],
    credentials: Arc<CredentialsHolder>,
) -> Result<DeployReport> {
    Orchestrator::new(Arc::new(CloudClients::new(credentials)))
        .deploy(specs)
        .await
}
