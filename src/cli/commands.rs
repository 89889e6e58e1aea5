//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_DEPLOYMENT_FILE;
use crate::provider::Provider;

/// fndeploy - Multi-region serverless function deployer.
#[derive(Parser, Debug)]
#[command(name = "fndeploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the deployment file.
    #[arg(
        short,
        long,
        global = true,
        env = "FNDEPLOY_FILE",
        default_value = DEFAULT_DEPLOYMENT_FILE
    )]
    pub file: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy every function of the deployment file.
    Deploy {
        /// Keep deploying remaining targets after a failure.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Print the deployment targets without touching any provider.
    Plan,

    /// Validate the deployment file.
    Validate,

    /// List functions deployed to a provider region.
    List {
        /// Provider to query (aws, google).
        #[arg(short, long)]
        provider: Provider,

        /// Region to query (defaults to the provider's default region).
        #[arg(short, long)]
        region: Option<String>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["fndeploy", "plan"]).unwrap();
        assert_eq!(cli.file, PathBuf::from("deployment.yaml"));
        assert!(!cli.verbose);
        assert!(matches!(cli.output, OutputFormat::Text));
        assert!(matches!(cli.command, Commands::Plan));
    }

    #[test]
    fn test_deploy_flags() {
        let cli = Cli::try_parse_from([
            "fndeploy",
            "deploy",
            "--continue-on-error",
            "-f",
            "other.yaml",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.file, PathBuf::from("other.yaml"));
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Deploy {
                continue_on_error: true
            }
        ));
    }

    #[test]
    fn test_list_parses_provider() {
        let cli = Cli::try_parse_from(["fndeploy", "list", "--provider", "aws"]).unwrap();
        match cli.command {
            Commands::List { provider, region } => {
                assert_eq!(provider, Provider::Aws);
                assert!(region.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["fndeploy", "list", "--provider", "azure"]).is_err());
    }
}
