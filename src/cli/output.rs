//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::orchestrator::{DeployReport, TargetOutcome};
use crate::planner::DeploymentPlan;
use crate::provider::Provider;
use crate::reconciler::ReconcileAction;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan target row for table display.
#[derive(Tabled)]
struct PlanTargetRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Function")]
    name: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Runtime")]
    runtime: String,
    #[tabled(rename = "Handler")]
    handler: String,
    #[tabled(rename = "Archive")]
    archive: String,
}

/// Deployment outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Function")]
    name: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Time")]
    elapsed: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan) -> String {
        if plan.is_empty() {
            return format!("{} No deployment targets.\n", "✓".green());
        }

        let mut output = String::from("\nDeployment Plan\n\n");

        let rows: Vec<PlanTargetRow> = plan
            .targets
            .iter()
            .enumerate()
            .map(|(i, t)| PlanTargetRow {
                index: i + 1,
                name: t.name.clone(),
                provider: t.provider.to_string(),
                region: t.region.clone(),
                runtime: t.runtime.clone(),
                handler: t.provider_handler(),
                archive: Self::truncate(&t.archive, 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} target(s), {} on AWS, {} on Google\n",
            plan.target_count().to_string().green(),
            plan.provider_count(Provider::Aws),
            plan.provider_count(Provider::Google)
        );

        output
    }

    /// Formats a deployment report.
    #[must_use]
    pub fn format_report(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &DeployReport) -> String {
        if report.outcomes.is_empty() {
            return format!("{} Nothing to deploy.\n", "✓".green());
        }

        let rows: Vec<OutcomeRow> = report
            .outcomes
            .iter()
            .map(|o| OutcomeRow {
                name: o.name.clone(),
                provider: o.provider.to_string(),
                region: o.region.clone(),
                result: Self::format_outcome(o),
                elapsed: format!("{:.1}s", Self::seconds(o.elapsed_ms)),
                details: o
                    .error
                    .as_deref()
                    .or(o.function_id.as_deref())
                    .map(|d| Self::truncate(d, 60))
                    .unwrap_or_default(),
            })
            .collect();

        let mut output = String::from("\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let status = if report.is_success() {
            format!("{} Deployment successful", "✓".green())
        } else {
            format!("{} Deployment failed", "✗".red())
        };
        let duration = report.finished_at - report.started_at;
        let _ = write!(
            output,
            "\n{status}: {} deployed, {} failed in {:.1}s\n",
            report.successful().to_string().green(),
            report.failed().to_string().red(),
            Self::seconds(u64::try_from(duration.num_milliseconds()).unwrap_or(0))
        );

        output
    }

    /// Formats the functions deployed to a provider region.
    #[must_use]
    pub fn format_functions(&self, provider: Provider, region: &str, functions: &[String]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "provider": provider,
                "region": region,
                "functions": functions,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\n{provider} functions in {region}:\n\n");
                if functions.is_empty() {
                    output.push_str("   No functions deployed.\n");
                    return output;
                }
                for function in functions {
                    let _ = writeln!(output, "   - {function}");
                }
                let _ = write!(output, "\n{} function(s)\n", functions.len());
                output
            }
        }
    }

    /// Formats a validation success message.
    #[must_use]
    pub fn format_valid(&self, functions: usize, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "status": "valid",
                "functions": functions,
                "targets": plan.target_count(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => format!(
                "{} Deployment file is valid: {functions} function(s), {} target(s)\n",
                "✓".green(),
                plan.target_count()
            ),
        }
    }

    /// Formats the result of one target with color.
    fn format_outcome(outcome: &TargetOutcome) -> String {
        match (outcome.action, outcome.is_success()) {
            (_, false) => "failed".red().to_string(),
            (Some(ReconcileAction::Created), true) => "+created".green().to_string(),
            (Some(ReconcileAction::Updated), true) => "~updated".yellow().to_string(),
            (None, true) => "done".dimmed().to_string(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn seconds(millis: u64) -> f64 {
        millis as f64 / 1000.0
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentSpec, ProviderBinding};
    use crate::planner::Planner;
    use chrono::Utc;

    fn plan() -> DeploymentPlan {
        let spec = DeploymentSpec {
            archive: String::from("s3://builds/hello.zip"),
            name: String::from("hello"),
            memory_mb: 128,
            timeout_secs: 30,
            providers: vec![ProviderBinding {
                name: String::from("AWS"),
                handler: String::from("main.handler"),
                runtime: String::from("python3.12"),
                regions: vec![String::from("us-east-1"), String::from("eu-west-1")],
            }],
        };
        Planner::new().plan(&[spec]).unwrap()
    }

    #[test]
    fn test_plan_text_lists_targets() {
        colored::control::set_override(false);
        let output = OutputFormatter::new(OutputFormat::Text).format_plan(&plan());
        assert!(output.contains("us-east-1"));
        assert!(output.contains("eu-west-1"));
        assert!(output.contains("main.handler"));
        assert!(output.contains("2 target(s), 2 on AWS, 0 on Google"));
    }

    #[test]
    fn test_plan_json_is_parseable() {
        let output = OutputFormatter::new(OutputFormat::Json).format_plan(&plan());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["targets"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["targets"][0]["provider"], "AWS");
    }

    #[test]
    fn test_report_text_shows_failures() {
        colored::control::set_override(false);
        let now = Utc::now();
        let report = DeployReport {
            started_at: now,
            finished_at: now,
            outcomes: vec![
                TargetOutcome {
                    name: String::from("hello"),
                    provider: Provider::Aws,
                    region: String::from("us-east-1"),
                    archive: Some(String::from("s3://builds/hello.zip")),
                    function_id: Some(String::from("arn:aws:lambda:us-east-1:1:function:hello")),
                    action: Some(ReconcileAction::Created),
                    elapsed_ms: 1200,
                    error: None,
                },
                TargetOutcome {
                    name: String::from("hello"),
                    provider: Provider::Google,
                    region: String::from("us-east1"),
                    archive: None,
                    function_id: None,
                    action: None,
                    elapsed_ms: 300,
                    error: Some(String::from("permission denied")),
                },
            ],
        };

        let output = OutputFormatter::new(OutputFormat::Text).format_report(&report);
        assert!(output.contains("+created"));
        assert!(output.contains("permission denied"));
        assert!(output.contains("Deployment failed: 1 deployed, 1 failed"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("ééééééé", 6), "ééé...");
    }
}
