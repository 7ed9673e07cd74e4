//! CLI interface and argument parsing

pub mod commands;

use clap::{Parser, Subcommand};

/// Exit code for an unreadable or invalid configuration
pub const EXIT_CONFIG: i32 = 2;
/// Exit code when a collaborator cannot be reached
pub const EXIT_CONNECTION: i32 = 4;
/// Exit code for any other failure
pub const EXIT_FATAL: i32 = 5;

/// Ingest Exporter - stages submitted experiments for the data repository
#[derive(Parser, Debug)]
#[command(name = "ingest-exporter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ingest-exporter.toml", env = "EXPORTER_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error), overrides the configuration
    #[arg(short, long, env = "EXPORTER_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume export messages until interrupted
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show the state of an export job
    Status(commands::status::StatusArgs),
}
