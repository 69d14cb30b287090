//! Interaction primitives built on the retry wrapper.
//!
//! Each primitive records its own outcomes and decides the tier of every
//! anomaly: structural failures become `Failed`, expected absence becomes
//! `Skipped` (or nothing, for optional controls), and best-effort steps only
//! log.

use crate::config::{ControlLocators, SubTabSpec, TabSpec, TimingConfig};
use crate::driver::{AutomationDriver, ElementHandle};
use crate::locator::{Locator, WaitCondition};
use crate::result::{TabwalkError, TabwalkResult};
use crate::retry::{click_with_retry, locate_with_retry};
use crate::state::{CheckKind, CheckOutcome, OutcomeSink, Verdict};
use std::time::Instant;

/// Drives one session through tabs, sub-tabs and the record workflow
pub struct Interactor<'a, D: AutomationDriver + ?Sized> {
    driver: &'a D,
    controls: &'a ControlLocators,
    timing: &'a TimingConfig,
    sink: &'a dyn OutcomeSink,
}

impl<D: AutomationDriver + ?Sized> std::fmt::Debug for Interactor<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interactor")
            .field("controls", self.controls)
            .field("timing", self.timing)
            .finish_non_exhaustive()
    }
}

impl<'a, D: AutomationDriver + ?Sized> Interactor<'a, D> {
    /// Create an interactor writing outcomes to `sink`
    pub fn new(
        driver: &'a D,
        controls: &'a ControlLocators,
        timing: &'a TimingConfig,
        sink: &'a dyn OutcomeSink,
    ) -> Self {
        Self {
            driver,
            controls,
            timing,
            sink,
        }
    }

    fn emit(&self, label: &str, kind: CheckKind, verdict: Verdict, message: impl Into<String>) {
        self.sink
            .record_outcome(CheckOutcome::new(label, kind, verdict, message));
    }

    async fn click(&self, element: &ElementHandle) -> bool {
        let clicked = click_with_retry(
            self.driver,
            element,
            self.timing.click_attempts,
            self.timing.retry_interval(),
        )
        .await;
        if clicked {
            tokio::time::sleep(self.timing.post_click_delay()).await;
        }
        clicked
    }

    async fn highlight(&self, element: &ElementHandle) {
        if let Err(err) = self.driver.highlight(element).await {
            tracing::debug!(locator = %element.locator, error = %err, "highlight skipped");
        }
    }

    /// Open a main tab and confirm its content rendered.
    ///
    /// Success means the content probe became visible, not merely that the
    /// click went through.
    pub async fn open_main_tab(&self, label: &str, tab: &TabSpec) -> bool {
        let start = Instant::now();
        let target = match locate_with_retry(
            self.driver,
            &tab.activation_target,
            WaitCondition::Clickable,
            &self.timing.element_lookup(),
        )
        .await
        {
            Ok(element) => element,
            Err(err) => {
                self.emit(
                    label,
                    CheckKind::MainTab,
                    Verdict::Failed,
                    format!("Tab '{}' could not be located: {err}", tab.name),
                );
                return false;
            }
        };
        self.highlight(&target).await;
        if !self.click(&target).await {
            self.emit(
                label,
                CheckKind::MainTab,
                Verdict::Failed,
                format!("Failed to click Tab '{}'", tab.name),
            );
            return false;
        }
        if let Err(err) = self.await_content(&tab.content_probe).await {
            tracing::debug!(tab = %tab.name, error = %err, "content probe failed");
            self.emit(
                label,
                CheckKind::MainTab,
                Verdict::Failed,
                format!(
                    "Tab '{}' was clicked but expected content did not appear",
                    tab.name
                ),
            );
            return false;
        }
        let elapsed = start.elapsed().as_secs_f64();
        self.sink.record_timing(&format!("Tab: {}", tab.name), elapsed);
        self.sink.record_outcome(
            CheckOutcome::new(
                label,
                CheckKind::MainTab,
                Verdict::Success,
                format!("Tab '{}' opened successfully in {elapsed:.2}s", tab.name),
            )
            .with_elapsed(elapsed),
        );
        true
    }

    /// Activate a sub-tab through its in-page trigger and confirm its content.
    pub async fn open_sub_tab(&self, label: &str, sub_tab: &SubTabSpec) -> bool {
        let start = Instant::now();
        if let Err(err) = self.driver.execute_script(&sub_tab.activation_trigger).await {
            let message = match err {
                TabwalkError::Script { message } => {
                    format!("JavaScript error on Sub Tab '{}': {message}", sub_tab.name)
                }
                other => format!(
                    "Unexpected error activating Sub Tab '{}': {other}",
                    sub_tab.name
                ),
            };
            self.emit(label, CheckKind::SubTab, Verdict::Failed, message);
            return false;
        }
        tokio::time::sleep(self.timing.post_click_delay()).await;
        if let Err(err) = self.await_content(&sub_tab.content_probe).await {
            tracing::debug!(sub_tab = %sub_tab.name, error = %err, "content probe failed");
            self.emit(
                label,
                CheckKind::SubTab,
                Verdict::Failed,
                format!(
                    "Sub Tab '{}' was activated but expected content did not appear",
                    sub_tab.name
                ),
            );
            return false;
        }
        let elapsed = start.elapsed().as_secs_f64();
        self.sink
            .record_timing(&format!("Sub-tab: {}", sub_tab.name), elapsed);
        self.sink.record_outcome(
            CheckOutcome::new(
                label,
                CheckKind::SubTab,
                Verdict::Success,
                format!(
                    "Sub Tab '{}' opened successfully in {elapsed:.2}s",
                    sub_tab.name
                ),
            )
            .with_elapsed(elapsed),
        );
        true
    }

    async fn await_content(&self, probe: &Locator) -> TabwalkResult<ElementHandle> {
        locate_with_retry(
            self.driver,
            probe,
            WaitCondition::Visible,
            &self.timing.content_probe(),
        )
        .await
    }

    /// Look for an optional control; absence is an answer, not an error.
    pub async fn probe_optional_control(&self, locator: &Locator) -> Option<ElementHandle> {
        match locate_with_retry(
            self.driver,
            locator,
            WaitCondition::Clickable,
            &self.timing.optional_control(),
        )
        .await
        {
            Ok(element) => Some(element),
            Err(err) => {
                tracing::debug!(%locator, error = %err, "optional control not present");
                None
            }
        }
    }

    /// Open the Add form if the tab has one, then back out of it.
    pub async fn exercise_add_control(&self, label: &str) {
        let Some(add) = self.probe_optional_control(&self.controls.add).await else {
            return;
        };
        self.highlight(&add).await;
        if !self.click(&add).await {
            tracing::debug!(label, "add control could not be clicked");
            return;
        }
        self.emit(
            label,
            CheckKind::Control,
            Verdict::Success,
            "Add button clicked successfully",
        );
        if let Err(err) = self.await_content(&self.controls.detail_pane).await {
            tracing::debug!(label, error = %err, "add form did not render");
        }
        self.return_to_list(label).await;
    }

    /// Open the first record of the list and dismiss it again.
    ///
    /// Returns `false` only when the list table itself never appeared. Empty
    /// lists, empty cells, records changing underneath the click and any
    /// other anomaly past that point are recorded as `Skipped`.
    pub async fn record_workflow_check(&self, label: &str, column: u32) -> bool {
        let start = Instant::now();
        if let Err(err) = locate_with_retry(
            self.driver,
            &self.controls.table,
            WaitCondition::Visible,
            &self.timing.table(),
        )
        .await
        {
            self.emit(
                label,
                CheckKind::RecordWorkflow,
                Verdict::Failed,
                format!("Failed to find the list table: {err}"),
            );
            return false;
        }
        if let Err(err) = self.walk_first_record(label, column, start).await {
            self.emit(
                label,
                CheckKind::RecordWorkflow,
                Verdict::Skipped,
                format!("Unexpected error in record workflow: {err}. Skipping."),
            );
        }
        true
    }

    async fn walk_first_record(&self, label: &str, column: u32, start: Instant) -> TabwalkResult<()> {
        if let Some(search) = self.probe_optional_control(&self.controls.search).await {
            if self.click(&search).await {
                self.emit(
                    label,
                    CheckKind::Control,
                    Verdict::Success,
                    "Search button clicked successfully",
                );
            }
        }

        let rows = self.driver.current_rows(&self.controls.rows).await?;
        if rows <= 1 {
            self.emit(
                label,
                CheckKind::RecordWorkflow,
                Verdict::Skipped,
                "There is no data in this sub-tab to validate (no rows). Skipping.",
            );
            return Ok(());
        }

        let link_locator = self.controls.record_link(column);
        let link = match locate_with_retry(
            self.driver,
            &link_locator,
            WaitCondition::Clickable,
            &self.timing.record_link(),
        )
        .await
        {
            Ok(link) => link,
            Err(err) if err.is_absence() || err.is_stale() => {
                self.emit(
                    label,
                    CheckKind::RecordWorkflow,
                    Verdict::Skipped,
                    format!(
                        "No clickable element found in column {column} of the first row - skipping."
                    ),
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.highlight(&link).await;
        let click_start = Instant::now();
        if !self.click(&link).await {
            self.emit(
                label,
                CheckKind::RecordWorkflow,
                Verdict::Skipped,
                format!("Record in column {column} changed before it could be opened - skipping."),
            );
            return Ok(());
        }
        self.sink.record_timing(
            "Record Workflow element click",
            click_start.elapsed().as_secs_f64(),
        );
        tracing::info!(label, column, "clicked first list element");

        let detail = self.await_content(&self.controls.detail_pane).await;
        self.return_to_list(label).await;
        detail?;

        let elapsed = start.elapsed().as_secs_f64();
        self.sink.record_timing("Record Workflow", elapsed);
        self.sink.record_outcome(
            CheckOutcome::new(
                label,
                CheckKind::RecordWorkflow,
                Verdict::Success,
                format!("Record Workflow Check completed in {elapsed:.2}s."),
            )
            .with_elapsed(elapsed),
        );
        Ok(())
    }

    /// Leave a detail or form view: Cancel when present, else browser back.
    pub async fn return_to_list(&self, label: &str) {
        if let Some(cancel) = self.probe_optional_control(&self.controls.cancel).await {
            if self.click(&cancel).await {
                self.emit(
                    label,
                    CheckKind::Control,
                    Verdict::Success,
                    "Cancel button clicked successfully",
                );
                return;
            }
            tracing::debug!(label, "cancel click failed, navigating back");
        }
        if let Err(err) = self.driver.go_back().await {
            tracing::debug!(label, error = %err, "back navigation failed");
        }
        tokio::time::sleep(self.timing.post_click_delay()).await;
    }
}
