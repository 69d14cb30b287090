//! Run state: outcomes, counters, status and progress of the current run.
//!
//! [`SharedRunState`] is the single owner of the mutable record. The worker
//! writes through it; the control surface only takes [`SharedRunState::snapshot`]
//! copies. Counters are only ever changed by [`SharedRunState::record_outcome`]
//! (or a buffered [`SharedRunState::commit`]) so they cannot drift from the
//! results list.

use crate::result::{TabwalkError, TabwalkResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Label used for run-level entries (login, summary, fatal errors)
pub const RUN_LABEL: &str = "run";

// =============================================================================
// OUTCOMES
// =============================================================================

/// Verdict of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Check passed
    Success,
    /// Check failed
    Failed,
    /// Check did not apply (no data, control absent, record changed)
    Skipped,
    /// Informational entry, never counted
    Info,
}

impl Verdict {
    /// Check if verdict is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
            Self::Info => "Info",
        };
        f.write_str(name)
    }
}

/// What a check exercised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Run-level entry
    Run,
    /// Opening a main tab
    MainTab,
    /// Activating a sub-tab
    SubTab,
    /// Optional control (Search, Add, Cancel)
    Control,
    /// First-record workflow
    RecordWorkflow,
}

/// Result of one interaction; immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Hierarchical label, e.g. "2" or "2.b"
    pub label: String,
    /// What was checked
    pub kind: CheckKind,
    /// Verdict
    pub verdict: Verdict,
    /// Human-readable message
    pub message: String,
    /// Time taken, when measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    /// When the outcome was recorded
    pub timestamp: DateTime<Utc>,
}

impl CheckOutcome {
    /// Create an outcome stamped now
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        kind: CheckKind,
        verdict: Verdict,
        message: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            verdict,
            message: message.into(),
            elapsed_seconds: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the measured duration
    #[must_use]
    pub const fn with_elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = Some(seconds);
        self
    }

    /// 1-based main-tab index encoded in the label, if any
    #[must_use]
    pub fn tab_index(&self) -> Option<usize> {
        self.label.split('.').next()?.parse().ok()
    }

    fn log(&self) {
        match self.verdict {
            Verdict::Success | Verdict::Info => {
                tracing::info!(label = %self.label, "{}", self.message);
            }
            Verdict::Skipped => {
                tracing::info!(label = %self.label, "Skipped: {}", self.message);
            }
            Verdict::Failed => {
                tracing::error!(label = %self.label, "{}", self.message);
            }
        }
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunStatus {
    /// No run since process start
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    /// Traversal in progress
    Running,
    /// Blocked at a node boundary
    Paused,
    /// Stop requested, worker winding down
    Stopping,
    /// Stopped on request
    Stopped,
    /// Every node opened and no record check hard-failed
    Completed,
    /// At least one failure, or a fatal error
    Failed,
}

impl RunStatus {
    /// A worker owns the state
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stopping)
    }

    /// Run concluded
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "Not Started",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// The in-flight or most recent run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Short run identifier
    pub run_id: Option<String>,
    /// Lifecycle status
    pub status: RunStatus,
    /// Environment under test
    pub environment: Option<String>,
    /// Run start
    pub start_time: Option<DateTime<Utc>>,
    /// Run end
    pub end_time: Option<DateTime<Utc>>,
    /// 0..=100, non-decreasing within a run
    pub progress_percent: u8,
    /// Successful checks
    pub successful: u32,
    /// Failed checks
    pub failed: u32,
    /// Skipped checks
    pub skipped: u32,
    /// Outcomes in recording order
    pub results: Vec<CheckOutcome>,
    /// Outcomes of the previous run, kept in retry-failed mode
    pub previous_results: Vec<CheckOutcome>,
    /// Timing samples per component, in seconds
    pub metrics: BTreeMap<String, Vec<f64>>,
    /// Screenshot paths captured this run
    pub screenshots: Vec<String>,
    /// Only previously failed tabs are visited
    pub retry_failed_only: bool,
}

impl RunState {
    /// Counted checks
    #[must_use]
    pub const fn total_checks(&self) -> u32 {
        self.successful + self.failed + self.skipped
    }

    /// Successful share of counted checks, in percent
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            0.0
        } else {
            f64::from(self.successful) / f64::from(total) * 100.0
        }
    }

    /// Wall-clock duration, up to now while running
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        match self.start_time {
            Some(start) => {
                let end = self.end_time.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    fn apply(&mut self, outcome: CheckOutcome) {
        match outcome.verdict {
            Verdict::Success => self.successful += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Skipped => self.skipped += 1,
            Verdict::Info => {}
        }
        self.results.push(outcome);
    }
}

// =============================================================================
// SINKS
// =============================================================================

/// Destination for outcomes produced while visiting one tab
pub trait OutcomeSink: Send + Sync {
    /// Record a check outcome
    fn record_outcome(&self, outcome: CheckOutcome);

    /// Record a timing sample for a component
    fn record_timing(&self, component: &str, seconds: f64);
}

/// Per-tab buffer committed to the run state in one step
#[derive(Debug, Default)]
pub struct TabBuffer {
    outcomes: Mutex<Vec<CheckOutcome>>,
    timings: Mutex<Vec<(String, f64)>>,
}

impl TabBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered outcomes
    #[must_use]
    pub fn outcomes(&self) -> Vec<CheckOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn into_parts(self) -> (Vec<CheckOutcome>, Vec<(String, f64)>) {
        (
            self.outcomes
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            self.timings
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl OutcomeSink for TabBuffer {
    fn record_outcome(&self, outcome: CheckOutcome) {
        outcome.log();
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }

    fn record_timing(&self, component: &str, seconds: f64) {
        self.timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((component.to_string(), seconds));
    }
}

/// Lock-guarded run state shared by the worker and the control surface
#[derive(Debug, Clone, Default)]
pub struct SharedRunState {
    inner: Arc<RwLock<RunState>>,
}

impl SharedRunState {
    /// Fresh state with status `NotStarted`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RunState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset for a new run and mark it Running; returns the run id.
    ///
    /// In retry-failed mode the outgoing results become `previous_results`.
    pub fn begin_run(
        &self,
        environment: impl Into<String>,
        retry_failed_only: bool,
    ) -> TabwalkResult<String> {
        let mut state = self.write();
        if state.status.is_active() {
            return Err(TabwalkError::RunInProgress {
                run_id: state.run_id.clone().unwrap_or_default(),
            });
        }
        let previous_results = if retry_failed_only {
            std::mem::take(&mut state.results)
        } else {
            Vec::new()
        };
        let run_id = new_run_id();
        *state = RunState {
            run_id: Some(run_id.clone()),
            status: RunStatus::Running,
            environment: Some(environment.into()),
            start_time: Some(Utc::now()),
            previous_results,
            retry_failed_only,
            ..RunState::default()
        };
        tracing::info!(run_id = %run_id, environment = ?state.environment, retry_failed_only, "validation run started");
        Ok(run_id)
    }

    /// Append an outcome and bump its counter
    pub fn record_outcome(&self, outcome: CheckOutcome) {
        outcome.log();
        self.write().apply(outcome);
    }

    /// Record a timing sample
    pub fn record_timing(&self, component: &str, seconds: f64) {
        self.write()
            .metrics
            .entry(component.to_string())
            .or_default()
            .push(seconds);
    }

    /// Record a captured screenshot
    pub fn record_screenshot(&self, path: impl Into<String>) {
        self.write().screenshots.push(path.into());
    }

    /// Commit a tab's buffered outcomes as one contiguous block
    pub fn commit(&self, buffer: TabBuffer) {
        let (outcomes, timings) = buffer.into_parts();
        let mut state = self.write();
        for outcome in outcomes {
            state.apply(outcome);
        }
        for (component, seconds) in timings {
            state.metrics.entry(component).or_default().push(seconds);
        }
    }

    /// Raise progress; lower values are ignored
    pub fn set_progress(&self, percent: u8) {
        let mut state = self.write();
        state.progress_percent = state.progress_percent.max(percent.min(100));
    }

    /// Move to `to` if the current status is one of `from`
    pub fn transition(&self, from: &[RunStatus], to: RunStatus) -> bool {
        let mut state = self.write();
        if from.contains(&state.status) {
            tracing::debug!(from = %state.status, to = %to, "run status transition");
            state.status = to;
            true
        } else {
            false
        }
    }

    /// Conclude the run.
    ///
    /// Progress becomes 100. `Completed` also forces `failed` to zero: the
    /// traversal verdict is authoritative and the counters must agree with it.
    pub fn finish_run(&self, status: RunStatus) {
        let mut state = self.write();
        state.status = status;
        state.end_time = Some(Utc::now());
        state.progress_percent = 100;
        if status == RunStatus::Completed {
            state.failed = 0;
        }
        tracing::info!(
            run_id = ?state.run_id,
            status = %status,
            successful = state.successful,
            failed = state.failed,
            skipped = state.skipped,
            "validation run finished"
        );
    }

    /// Record a run-level failure entry and conclude as Failed
    pub fn fail_run(&self, message: impl Into<String>) {
        self.record_outcome(CheckOutcome::new(
            RUN_LABEL,
            CheckKind::Run,
            Verdict::Failed,
            message,
        ));
        self.finish_run(RunStatus::Failed);
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.read().status
    }

    /// Whether a worker owns the state
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.read().status.is_active()
    }

    /// Read-only copy of the whole record
    #[must_use]
    pub fn snapshot(&self) -> RunState {
        self.read().clone()
    }
}

impl OutcomeSink for SharedRunState {
    fn record_outcome(&self, outcome: CheckOutcome) {
        Self::record_outcome(self, outcome);
    }

    fn record_timing(&self, component: &str, seconds: f64) {
        Self::record_timing(self, component, seconds);
    }
}

fn new_run_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
