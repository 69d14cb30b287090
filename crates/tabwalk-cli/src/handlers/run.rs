//! Run command handler: one validation in the foreground

use std::path::{Path, PathBuf};
use std::time::Duration;
use tabwalk::{
    DriverFactory, ExecutionMode, RunReport, RunRequest, RunState, ValidationConfig,
    ValidationRunner,
};

use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::{ReportFormat, RunArgs};

/// How often the progress bar samples the run state
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Apply `--workers` on top of the configured execution mode
pub fn apply_workers(config: &mut ValidationConfig, workers: Option<usize>) -> CliResult<()> {
    match workers {
        None => Ok(()),
        Some(0) => Err(CliError::invalid_argument("--workers must be at least 1")),
        Some(count) => {
            config.execution.mode = ExecutionMode::Parallel;
            config.execution.workers = count;
            Ok(())
        }
    }
}

/// Execute a run to its terminal status and write the report.
///
/// Returns the final state whatever the status; the caller decides the exit
/// code.
pub async fn execute_run<F: DriverFactory>(
    mut config: ValidationConfig,
    args: &RunArgs,
    reporter: &mut ProgressReporter,
    factory: F,
) -> CliResult<RunState> {
    apply_workers(&mut config, args.workers)?;
    config.base_url(&args.env)?;

    let project_name = config.project_name.clone();
    let reports_dir = config.output.reports_dir.clone();
    let runner = ValidationRunner::new(config, factory);
    let run_id = runner.start_run(RunRequest::new(args.env.clone()))?;

    reporter.header(&format!("{project_name} [{}] run {run_id}", args.env));
    reporter.start_progress(&args.env);
    while runner.is_active() {
        let snapshot = runner.snapshot();
        reporter.set_percent(snapshot.progress_percent);
        if let Some(last) = snapshot.results.last() {
            reporter.set_message(&format!("{} {}", last.label, last.verdict));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    let state = runner.wait_for_completion().await;
    reporter.set_percent(state.progress_percent);
    reporter.finish(state.status);

    for outcome in state.results.iter().filter(|o| reporter.shows(o)) {
        reporter.outcome(outcome);
    }

    let report = RunReport::from_state(&project_name, &state);
    let written = write_report(&report, args.report.as_deref(), &reports_dir)?;
    reporter.info(&format!("Report written to {}", written.display()));

    match args.format {
        ReportFormat::Text => reporter.status_line(state.status, &report.summary()),
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| CliError::run_failed(format!("Cannot serialize report: {e}")))?;
            println!("{json}");
        }
    }
    Ok(state)
}

/// Write the HTML report to `target`, or into `reports_dir` under its default name
pub fn write_report(
    report: &RunReport,
    target: Option<&Path>,
    reports_dir: &Path,
) -> CliResult<PathBuf> {
    match target {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, report.render_html())?;
            Ok(path.to_path_buf())
        }
        None => Ok(report.save_html(reports_dir)?),
    }
}
