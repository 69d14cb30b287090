//! Tabwalk CLI: browser-driven UI regression checks
//!
//! ## Usage
//!
//! ```bash
//! tabwalk check                          # Validate tabwalk.yaml, print the tab tree
//! tabwalk run --env staging              # One run in the foreground
//! tabwalk run --env staging --workers 3  # Tabs in parallel sessions
//! tabwalk serve --port 5000              # HTTP control panel
//! ```

use clap::Parser;
use std::process::ExitCode;
use tabwalk::{RunStatus, ValidationConfig};
use tabwalk_cli::handlers::{execute_check, execute_run, execute_serve, load_config};
use tabwalk_cli::{
    init_logging, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, ProgressReporter,
    RunArgs, ServeArgs, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    // Build configuration from CLI args
    let config = build_config(&cli);

    match cli.command {
        Commands::Check(args) => {
            print!("{}", execute_check(&config.config_path, &args)?);
            Ok(())
        }
        Commands::Run(args) => run_validation(&config, &args),
        Commands::Serve(args) => run_serve(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_config_path(&cli.config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create async runtime: {e}")))
}

fn load_with_logging(config: &CliConfig) -> CliResult<(ValidationConfig, std::path::PathBuf)> {
    let validation = load_config(&config.config_path)?;
    let log_file = init_logging(&validation.output.log_dir, config)?;
    Ok((validation, log_file))
}

fn run_validation(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let (validation, _) = load_with_logging(config)?;
    let mut reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
            .with_verbose(config.verbosity.is_verbose());
    let factory = browser_factory()?;

    let state = runtime()?.block_on(execute_run(validation, args, &mut reporter, factory))?;
    if state.status == RunStatus::Completed {
        Ok(())
    } else {
        Err(CliError::run_failed(format!(
            "{} ({} failed, {} skipped)",
            state.status, state.failed, state.skipped
        )))
    }
}

fn run_serve(config: &CliConfig, args: &ServeArgs) -> CliResult<()> {
    let (validation, log_file) = load_with_logging(config)?;
    let factory = browser_factory()?;
    runtime()?.block_on(execute_serve(validation, args, log_file, factory))
}

#[cfg(feature = "browser")]
#[allow(clippy::unnecessary_wraps)]
const fn browser_factory() -> CliResult<tabwalk::ChromiumFactory> {
    Ok(tabwalk::ChromiumFactory)
}

#[cfg(not(feature = "browser"))]
fn browser_factory() -> CliResult<tabwalk::mock::ScriptedFactory> {
    Err(CliError::config(
        "Browser support not enabled. Rebuild with --features browser",
    ))
}
