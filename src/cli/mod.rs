//! CLI module for fndeploy.
//!
//! This module provides the command-line interface for deploying
//! functions and inspecting deployment plans.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
