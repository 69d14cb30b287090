//! Tabwalk CLI library
//!
//! Command-line interface and HTTP control panel for Tabwalk validation runs.
//! The binary is a thin dispatcher; everything here can be driven from tests
//! with [`tabwalk::mock::ScriptedFactory`] in place of a real browser.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;
pub mod server;

pub use commands::{CheckArgs, Cli, ColorArg, Commands, ReportFormat, RunArgs, ServeArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use logging::{init_logging, log_file_path, tail_lines, LOG_FILE_NAME};
pub use output::{format_outcome, ProgressReporter};
pub use server::{router, AppState};
