//! fndeploy CLI entrypoint.
//!
//! This is the main entrypoint for the fndeploy command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use fndeploy::cli::{Cli, Commands, OutputFormatter};
use fndeploy::config::{ConfigParser, CredentialsHolder, DeploymentFile};
use fndeploy::error::{DeployError, Result};
use fndeploy::orchestrator::{ClientFactory, Orchestrator};
use fndeploy::planner::{DeploymentPlan, Planner};
use fndeploy::provider::{CloudClients, Provider};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Deploy { continue_on_error } => {
            cmd_deploy(&cli.file, continue_on_error, &formatter).await
        }
        Commands::Plan => cmd_plan(&cli.file, &formatter),
        Commands::Validate => cmd_validate(&cli.file, &formatter),
        Commands::List { provider, region } => {
            cmd_list(&cli.file, provider, region, &formatter).await
        }
    }
}

/// Deploy every function of the deployment file.
async fn cmd_deploy(
    file_path: &Path,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (file, plan) = load_and_plan(file_path)?;

    if plan.is_empty() {
        eprintln!("{}", formatter.format_plan(&plan));
        return Ok(());
    }

    let credentials = CredentialsHolder::load(&base_dir(file_path), &file.required_providers())?;
    let factory = Arc::new(CloudClients::new(Arc::new(credentials)));

    let report = Orchestrator::new(factory)
        .with_continue_on_error(continue_on_error)
        .execute(plan)
        .await?;

    eprintln!("{}", formatter.format_report(&report));

    if report.is_success() {
        info!("Deployment complete");
        Ok(())
    } else {
        error!("{} of {} target(s) failed", report.failed(), report.outcomes.len());
        Err(DeployError::internal(format!(
            "{} of {} target(s) failed",
            report.failed(),
            report.outcomes.len()
        )))
    }
}

/// Show deployment plan.
fn cmd_plan(file_path: &Path, formatter: &OutputFormatter) -> Result<()> {
    let (_file, plan) = load_and_plan(file_path)?;
    eprintln!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Validate the deployment file.
fn cmd_validate(file_path: &Path, formatter: &OutputFormatter) -> Result<()> {
    let (file, plan) = load_and_plan(file_path)?;
    eprintln!("{}", formatter.format_valid(file.functions.len(), &plan));
    Ok(())
}

/// List deployed functions.
async fn cmd_list(
    file_path: &Path,
    provider: Provider,
    region: Option<String>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let dir = base_dir(file_path);
    ConfigParser::new().with_base_path(&dir).load_dotenv()?;

    let region = region.unwrap_or_else(|| provider.default_region().to_string());
    let credentials = CredentialsHolder::load(&dir, &[provider].into_iter().collect())?;
    let factory = CloudClients::new(Arc::new(credentials));

    let client = factory.function_client(provider, &region).await?;
    let functions = client.list_functions().await?;

    eprintln!("{}", formatter.format_functions(provider, &region, &functions));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Returns the directory holding the deployment file.
fn base_dir(file_path: &Path) -> PathBuf {
    file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads the deployment file and plans its targets.
fn load_and_plan(file_path: &Path) -> Result<(DeploymentFile, DeploymentPlan)> {
    debug!("Loading deployment file from: {}", file_path.display());

    let parser = ConfigParser::new().with_base_path(base_dir(file_path));
    parser.load_dotenv()?;

    let file = parser.load_file(file_path)?;
    debug!(
        "Loaded {} function(s) declaring {} target(s)",
        file.functions.len(),
        file.target_count()
    );
    let plan = Planner::new().plan(&file.functions)?;

    Ok((file, plan))
}
