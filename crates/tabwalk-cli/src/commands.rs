//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tabwalk: browser-driven UI regression checks over a declared tab tree
#[derive(Parser, Debug)]
#[command(name = "tabwalk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Validation configuration (YAML or JSON)
    #[arg(short, long, default_value = "tabwalk.yaml", global = true)]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP control panel
    Serve(ServeArgs),

    /// Run one validation in the foreground
    Run(RunArgs),

    /// Validate the configuration and print the tab tree
    Check(CheckArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    pub port: u16,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Environment to validate
    #[arg(short, long)]
    pub env: String,

    /// Run tabs in parallel with this many browser sessions
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Write the HTML report to this file instead of the reports directory
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Summary format
    #[arg(short, long, default_value = "text")]
    pub format: ReportFormat,
}

/// Arguments for the check command
#[derive(Parser, Debug, Default)]
pub struct CheckArgs {
    /// Print the parsed configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Summary output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON report model
    Json,
}

/// Color argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
