//! Run orchestration: one background worker per run, controlled from outside.
//!
//! [`ValidationRunner`] is what a control surface talks to. It rejects a
//! second run while one is active, owns the pause/stop control of the active
//! run, and hands out read-only snapshots of the run state. The worker task
//! resolves the environment, launches the browser session(s), loads the
//! start page, runs the traversal and always closes every session it opened.

use crate::capture::ScreenshotStore;
use crate::config::{ExecutionMode, ValidationConfig};
use crate::control::RunControl;
use crate::driver::{AutomationDriver, DriverFactory};
use crate::engine::{panic_message, plan_tabs, TraversalEngine, SESSION_READY_PROGRESS};
use crate::result::{TabwalkError, TabwalkResult};
use crate::retry::navigate_with_retry;
use crate::state::{CheckKind, CheckOutcome, RunState, RunStatus, SharedRunState, Verdict, RUN_LABEL};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

/// Parameters of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Environment name from the configuration
    pub environment: String,
    /// Visit only tabs that failed in the previous run
    pub retry_failed_only: bool,
}

impl RunRequest {
    /// Full run against `environment`
    #[must_use]
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            retry_failed_only: false,
        }
    }

    /// Only revisit previously failed tabs
    #[must_use]
    pub const fn retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed_only = retry;
        self
    }
}

#[derive(Debug)]
struct ActiveRun {
    run_id: String,
    control: RunControl,
    finished: watch::Receiver<bool>,
}

/// Starts, controls and observes validation runs
pub struct ValidationRunner<F: DriverFactory> {
    config: Arc<ValidationConfig>,
    factory: Arc<F>,
    state: SharedRunState,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl<F: DriverFactory> Clone for ValidationRunner<F> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            factory: Arc::clone(&self.factory),
            state: self.state.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<F: DriverFactory> fmt::Debug for ValidationRunner<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRunner")
            .field("project", &self.config.project_name)
            .field("status", &self.state.status())
            .finish_non_exhaustive()
    }
}

impl<F: DriverFactory> ValidationRunner<F> {
    /// Create a runner; the run state starts as `NotStarted`
    pub fn new(config: ValidationConfig, factory: F) -> Self {
        Self {
            config: Arc::new(config),
            factory: Arc::new(factory),
            state: SharedRunState::new(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Configuration the runner was built with
    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Shared run state
    #[must_use]
    pub const fn state(&self) -> &SharedRunState {
        &self.state
    }

    /// Read-only copy of the run state
    #[must_use]
    pub fn snapshot(&self) -> RunState {
        self.state.snapshot()
    }

    /// Whether a run is in progress
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Identifier of the latest run
    #[must_use]
    pub fn current_run_id(&self) -> Option<String> {
        self.active().as_ref().map(|a| a.run_id.clone())
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a run in the background and return its id.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `RunInProgress` while another run is active.
    pub fn start_run(&self, request: RunRequest) -> TabwalkResult<String> {
        let mut active = self.active();
        let run_id = self
            .state
            .begin_run(&request.environment, request.retry_failed_only)?;
        let control = RunControl::new();
        let (done_tx, done_rx) = watch::channel(false);

        let worker = tokio::spawn(execute_run(
            Arc::clone(&self.config),
            Arc::clone(&self.factory),
            self.state.clone(),
            control.clone(),
            run_id.clone(),
            request.environment,
        ));
        let state = self.state.clone();
        tokio::spawn(async move {
            match worker.await {
                Err(err) if state.is_active() => {
                    state.fail_run(format!("Validation task terminated unexpectedly: {err}"));
                }
                Ok(()) if state.is_active() => {
                    state.fail_run("Validation ended without a verdict");
                }
                _ => {}
            }
            done_tx.send_replace(true);
        });

        *active = Some(ActiveRun {
            run_id: run_id.clone(),
            control,
            finished: done_rx,
        });
        Ok(run_id)
    }

    /// Pause a running run or resume a paused one; returns the new status
    pub fn pause_or_resume(&self) -> TabwalkResult<RunStatus> {
        let active = self.active();
        let Some(run) = active.as_ref().filter(|_| self.state.is_active()) else {
            return Err(TabwalkError::invalid_state("No validation is currently running"));
        };
        if self.state.transition(&[RunStatus::Running], RunStatus::Paused) {
            run.control.pause();
            return Ok(RunStatus::Paused);
        }
        if self.state.transition(&[RunStatus::Paused], RunStatus::Running) {
            run.control.resume();
            return Ok(RunStatus::Running);
        }
        Err(TabwalkError::invalid_state(format!(
            "Cannot pause or resume while {}",
            self.state.status()
        )))
    }

    /// Request stop; the worker halts at its next node boundary
    pub fn stop(&self) -> TabwalkResult<()> {
        let active = self.active();
        let Some(run) = active.as_ref().filter(|_| self.state.is_active()) else {
            return Err(TabwalkError::invalid_state("No validation is currently running"));
        };
        self.state.transition(
            &[RunStatus::Running, RunStatus::Paused],
            RunStatus::Stopping,
        );
        run.control.stop();
        Ok(())
    }

    /// Wait for the latest run to conclude and return the final state
    pub async fn wait_for_completion(&self) -> RunState {
        let finished = self.active().as_ref().map(|a| a.finished.clone());
        if let Some(mut finished) = finished {
            let _ = finished.wait_for(|done| *done).await;
        }
        self.snapshot()
    }
}

async fn execute_run<F: DriverFactory>(
    config: Arc<ValidationConfig>,
    factory: Arc<F>,
    state: SharedRunState,
    control: RunControl,
    run_id: String,
    environment: String,
) {
    let base_url = match config.base_url(&environment) {
        Ok(url) => url.to_string(),
        Err(err) => {
            state.fail_run(format!("Cannot start validation: {err}"));
            return;
        }
    };

    let plan = {
        let snapshot = state.snapshot();
        plan_tabs(&config, &snapshot.previous_results, snapshot.retry_failed_only)
    };
    let wanted = match config.execution.mode {
        ExecutionMode::Sequential => 1,
        ExecutionMode::Parallel => config.execution.workers.clamp(1, plan.len().max(1)),
    };

    let sessions = match launch_sessions(factory.as_ref(), &config, wanted).await {
        Ok(sessions) => sessions,
        Err(err) => {
            state.fail_run(format!("Failed to initialize browser session: {err}"));
            return;
        }
    };

    let run = Drive {
        config: &config,
        state: &state,
        control: &control,
        run_id: &run_id,
        environment: &environment,
        base_url: &base_url,
    };
    let outcome = AssertUnwindSafe(run.drive(&sessions, &plan))
        .catch_unwind()
        .await;

    for session in &sessions {
        if let Err(err) = session.close().await {
            tracing::warn!(error = %err, "failed to close browser session");
        }
    }

    if let Err(payload) = outcome {
        state.fail_run(format!(
            "Validation task terminated unexpectedly: {}",
            panic_message(payload.as_ref())
        ));
    }
}

async fn launch_sessions<F: DriverFactory>(
    factory: &F,
    config: &ValidationConfig,
    count: usize,
) -> TabwalkResult<Vec<F::Driver>> {
    let mut sessions = Vec::with_capacity(count);
    for worker in 0..count {
        match factory.launch(&config.browser).await {
            Ok(session) => {
                tracing::debug!(worker, "browser session launched");
                sessions.push(session);
            }
            Err(err) => {
                for session in &sessions {
                    if let Err(close_err) = session.close().await {
                        tracing::warn!(error = %close_err, "failed to close browser session");
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(sessions)
}

struct Drive<'a> {
    config: &'a ValidationConfig,
    state: &'a SharedRunState,
    control: &'a RunControl,
    run_id: &'a str,
    environment: &'a str,
    base_url: &'a str,
}

impl Drive<'_> {
    fn info(&self, message: impl Into<String>) {
        self.state.record_outcome(CheckOutcome::new(
            RUN_LABEL,
            CheckKind::Run,
            Verdict::Info,
            message,
        ));
    }

    async fn drive<D: AutomationDriver>(&self, sessions: &[D], plan: &[usize]) {
        let timing = &self.config.timing;
        let load_start = Instant::now();
        for session in sessions {
            if let Err(err) = navigate_with_retry(
                session,
                self.base_url,
                timing.navigation_attempts,
                timing.ready_timeout(),
                timing.navigation_retry_delay(),
            )
            .await
            {
                self.state
                    .fail_run(format!("Failed to load {}: {err}", self.base_url));
                return;
            }
        }
        self.state
            .record_timing("Page load", load_start.elapsed().as_secs_f64());
        self.info(format!(
            "Session ready on {} ({})",
            self.environment, self.base_url
        ));

        let store = self.config.output.capture_screenshots.then(|| {
            ScreenshotStore::new(
                &self.config.output.screenshots_dir,
                self.run_id,
                self.state.clone(),
            )
        });
        if let (Some(store), Some(first)) = (&store, sessions.first()) {
            store
                .capture(first, &format!("{}_login", self.environment))
                .await;
        }
        self.state.set_progress(SESSION_READY_PROGRESS);

        let mut engine = TraversalEngine::new(self.config, self.state, self.control);
        if let Some(store) = &store {
            engine = engine.with_screenshots(store);
        }
        let summary = engine.run(sessions, plan).await;

        if let (Some(store), Some(first)) = (&store, sessions.first()) {
            store
                .capture(first, &format!("{}_final", self.environment))
                .await;
        }

        let status = if summary.stopped {
            RunStatus::Stopped
        } else if summary.all_tabs_opened {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };

        let snapshot = self.state.snapshot();
        let failed = if status == RunStatus::Completed {
            0
        } else {
            snapshot.failed
        };
        let total = snapshot.successful + failed + snapshot.skipped;
        let rate = if total == 0 {
            0.0
        } else {
            f64::from(snapshot.successful) / f64::from(total) * 100.0
        };
        self.info(format!(
            "Validation summary for {}: {total} checks, {} successful ({rate:.1}%), {failed} failed, {} skipped in {:.2}s",
            self.environment,
            snapshot.successful,
            snapshot.skipped,
            snapshot.duration_seconds()
        ));
        match status {
            RunStatus::Stopped => self.info(format!(
                "Validation stopped by user after {} of {} tabs.",
                summary.tabs_visited, summary.tabs_planned
            )),
            RunStatus::Completed => self.info("Validation completed successfully."),
            _ => self.info(format!("Validation failed: {failed} check(s) failed.")),
        }
        self.state.finish_run(status);
    }
}
