//! Traversal engine: walks the tab tree and aggregates the verdict.
//!
//! Main tabs are visited in declared order (or pulled from a shared queue
//! by one worker per session in parallel mode). Every main tab and every
//! sub-tab is a node boundary: the engine waits there while paused, halts
//! there once stopped, and catches panics there so one bad node cannot end
//! the walk.

use crate::capture::ScreenshotStore;
use crate::config::{ColumnResolution, TabSpec, ValidationConfig};
use crate::control::{Flow, RunControl};
use crate::driver::AutomationDriver;
use crate::interaction::Interactor;
use crate::state::{CheckKind, CheckOutcome, OutcomeSink, SharedRunState, TabBuffer, Verdict};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Progress reported once the session is up, before the first tab
pub const SESSION_READY_PROGRESS: u8 = 5;

/// Progress share spread over the planned tabs
const TRAVERSAL_PROGRESS_SPAN: usize = 90;

/// Outcome of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalSummary {
    /// Every visited node opened and no record check hard-failed
    pub all_tabs_opened: bool,
    /// Traversal halted on a stop request
    pub stopped: bool,
    /// Main tabs processed
    pub tabs_visited: usize,
    /// Main tabs planned
    pub tabs_planned: usize,
}

#[derive(Debug, Clone, Copy)]
struct TabVisit {
    ok: bool,
    halted: bool,
}

/// Label of a main tab (1-based)
#[must_use]
pub fn tab_label(index: usize) -> String {
    (index + 1).to_string()
}

/// Letter suffix of a sub-tab: a..z, then aa, ab, ...
#[must_use]
pub fn sub_tab_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'a' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Indices of the tabs to visit.
///
/// In retry-failed mode only tabs with a `Failed` outcome in `previous` are
/// visited; when there are none, the whole tree is.
#[must_use]
pub fn plan_tabs(
    config: &ValidationConfig,
    previous: &[CheckOutcome],
    retry_failed_only: bool,
) -> Vec<usize> {
    let all: Vec<usize> = (0..config.tabs.len()).collect();
    if !retry_failed_only {
        return all;
    }
    let failed: BTreeSet<usize> = previous
        .iter()
        .filter(|o| o.verdict.is_failed())
        .filter_map(CheckOutcome::tab_index)
        .filter(|i| (1..=config.tabs.len()).contains(i))
        .map(|i| i - 1)
        .collect();
    if failed.is_empty() {
        all
    } else {
        failed.into_iter().collect()
    }
}

fn progress_for(visited: usize, planned: usize) -> u8 {
    if planned == 0 {
        return SESSION_READY_PROGRESS;
    }
    let span = visited.min(planned) * TRAVERSAL_PROGRESS_SPAN / planned;
    SESSION_READY_PROGRESS + span as u8
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one node, recording a panic as a `Failed` outcome.
///
/// The node counts as not completed and the traversal moves on.
async fn guarded<F>(label: &str, node: &str, kind: CheckKind, sink: &dyn OutcomeSink, visit: F) -> bool
where
    F: Future<Output = bool>,
{
    match AssertUnwindSafe(visit).catch_unwind().await {
        Ok(ok) => ok,
        Err(payload) => {
            sink.record_outcome(CheckOutcome::new(
                label,
                kind,
                Verdict::Failed,
                format!(
                    "Unexpected error while processing {node}: {}",
                    panic_message(payload.as_ref())
                ),
            ));
            false
        }
    }
}

fn next_tab(queue: &Mutex<VecDeque<usize>>) -> Option<usize> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

/// Walks the configured tree against one or more sessions
#[derive(Debug)]
pub struct TraversalEngine<'a> {
    config: &'a ValidationConfig,
    state: &'a SharedRunState,
    control: &'a RunControl,
    screenshots: Option<&'a ScreenshotStore>,
}

impl<'a> TraversalEngine<'a> {
    /// Create an engine writing into `state` and obeying `control`
    #[must_use]
    pub const fn new(
        config: &'a ValidationConfig,
        state: &'a SharedRunState,
        control: &'a RunControl,
    ) -> Self {
        Self {
            config,
            state,
            control,
            screenshots: None,
        }
    }

    /// Capture a screenshot after each opened main tab
    #[must_use]
    pub const fn with_screenshots(mut self, store: &'a ScreenshotStore) -> Self {
        self.screenshots = Some(store);
        self
    }

    /// Visit `plan` with one session per worker.
    ///
    /// A single session walks the plan strictly in order, streaming outcomes
    /// into the run state. Several sessions pull tabs from a shared queue;
    /// each tab's outcomes are buffered and committed as one block.
    pub async fn run<D: AutomationDriver>(&self, sessions: &[D], plan: &[usize]) -> TraversalSummary {
        match sessions {
            [] => TraversalSummary {
                all_tabs_opened: false,
                stopped: false,
                tabs_visited: 0,
                tabs_planned: plan.len(),
            },
            [driver] => self.run_sequential(driver, plan).await,
            _ => self.run_parallel(sessions, plan).await,
        }
    }

    /// Visit `plan` in order on one session
    pub async fn run_sequential<D: AutomationDriver + ?Sized>(
        &self,
        driver: &D,
        plan: &[usize],
    ) -> TraversalSummary {
        let mut summary = TraversalSummary {
            all_tabs_opened: true,
            stopped: false,
            tabs_visited: 0,
            tabs_planned: plan.len(),
        };
        for (position, &index) in plan.iter().enumerate() {
            if position > 0 {
                tokio::time::sleep(self.config.timing.settle_delay()).await;
            }
            if self.control.checkpoint().await == Flow::Stop {
                summary.stopped = true;
                break;
            }
            let visit = self.visit_tab(driver, index, self.state).await;
            summary.all_tabs_opened &= visit.ok;
            summary.tabs_visited += 1;
            self.state
                .set_progress(progress_for(summary.tabs_visited, plan.len()));
            if visit.halted {
                summary.stopped = true;
                break;
            }
        }
        summary
    }

    /// Visit `plan` with one worker per session
    pub async fn run_parallel<D: AutomationDriver>(
        &self,
        sessions: &[D],
        plan: &[usize],
    ) -> TraversalSummary {
        let queue = Mutex::new(plan.iter().copied().collect::<VecDeque<_>>());
        let visited = AtomicUsize::new(0);
        let all_ok = AtomicBool::new(true);
        let stopped = AtomicBool::new(false);

        let workers = sessions.iter().enumerate().map(|(worker, driver)| {
            let (queue, visited, all_ok, stopped) = (&queue, &visited, &all_ok, &stopped);
            async move {
                let mut first = true;
                loop {
                    if !first {
                        tokio::time::sleep(self.config.timing.settle_delay()).await;
                    }
                    first = false;
                    if self.control.checkpoint().await == Flow::Stop {
                        stopped.store(true, Ordering::SeqCst);
                        break;
                    }
                    let Some(index) = next_tab(queue) else {
                        break;
                    };
                    tracing::debug!(worker, tab = %self.config.tabs[index].name, "worker picked tab");
                    let buffer = TabBuffer::new();
                    let visit = self.visit_tab(driver, index, &buffer).await;
                    self.state.commit(buffer);
                    if !visit.ok {
                        all_ok.store(false, Ordering::SeqCst);
                    }
                    let done = visited.fetch_add(1, Ordering::SeqCst) + 1;
                    self.state.set_progress(progress_for(done, plan.len()));
                    if visit.halted {
                        stopped.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
        futures::future::join_all(workers).await;

        TraversalSummary {
            all_tabs_opened: all_ok.load(Ordering::SeqCst),
            stopped: stopped.load(Ordering::SeqCst),
            tabs_visited: visited.load(Ordering::SeqCst),
            tabs_planned: plan.len(),
        }
    }

    async fn visit_tab<D: AutomationDriver + ?Sized>(
        &self,
        driver: &D,
        index: usize,
        sink: &dyn OutcomeSink,
    ) -> TabVisit {
        let tab = &self.config.tabs[index];
        let label = tab_label(index);
        let interactor = Interactor::new(driver, &self.config.controls, &self.config.timing, sink);
        let node = format!("Tab '{}'", tab.name);

        let opened = guarded(&label, &node, CheckKind::MainTab, sink, async {
            if !interactor.open_main_tab(&label, tab).await {
                return false;
            }
            if let Some(store) = self.screenshots {
                store.capture(driver, &format!("tab_{}", tab.name)).await;
            }
            if self.config.execution.exercise_add_control {
                interactor.exercise_add_control(&label).await;
            }
            match tab.own_record_column() {
                Some(column) => interactor.record_workflow_check(&label, column).await,
                None => true,
            }
        })
        .await;
        if !opened {
            return TabVisit {
                ok: false,
                halted: false,
            };
        }

        let mut ok = true;
        for (position, sub_tab) in tab.sub_tabs().iter().enumerate() {
            if self.control.checkpoint().await == Flow::Stop {
                return TabVisit { ok, halted: true };
            }
            let sub_label = format!("{label}.{}", sub_tab_letter(position));
            let node = format!("Sub Tab '{}' of Tab '{}'", sub_tab.name, tab.name);
            ok &= guarded(&sub_label, &node, CheckKind::SubTab, sink, async {
                if !interactor.open_sub_tab(&sub_label, sub_tab).await {
                    return false;
                }
                self.check_records(&interactor, tab, &sub_tab.name, &sub_label, sink)
                    .await
            })
            .await;
        }
        TabVisit { ok, halted: false }
    }

    async fn check_records<D: AutomationDriver + ?Sized>(
        &self,
        interactor: &Interactor<'_, D>,
        tab: &TabSpec,
        sub_tab: &str,
        label: &str,
        sink: &dyn OutcomeSink,
    ) -> bool {
        match tab.record_column_for(sub_tab) {
            ColumnResolution::NotConfigured => true,
            ColumnResolution::Unspecified => {
                sink.record_outcome(CheckOutcome::new(
                    label,
                    CheckKind::RecordWorkflow,
                    Verdict::Skipped,
                    format!("Record column not specified for Sub Tab '{sub_tab}'. Skipping."),
                ));
                true
            }
            ColumnResolution::Column(column) => {
                interactor.record_workflow_check(label, column).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecordColumn, SubTabSpec, TimingConfig};
    use crate::locator::Locator;
    use crate::mock::{ScriptedDriver, ScriptedElement, ScriptedPage};

    mod label_tests {
        use super::*;

        #[test]
        fn test_sub_tab_letters() {
            assert_eq!(sub_tab_letter(0), "a");
            assert_eq!(sub_tab_letter(1), "b");
            assert_eq!(sub_tab_letter(25), "z");
            assert_eq!(sub_tab_letter(26), "aa");
            assert_eq!(sub_tab_letter(27), "ab");
        }

        #[test]
        fn test_tab_label_is_one_based() {
            assert_eq!(tab_label(0), "1");
            assert_eq!(tab_label(9), "10");
        }

        #[test]
        fn test_progress_span() {
            assert_eq!(progress_for(0, 4), 5);
            assert_eq!(progress_for(2, 4), 50);
            assert_eq!(progress_for(4, 4), 95);
            assert_eq!(progress_for(0, 0), 5);
        }

        #[test]
        fn test_panic_message_variants() {
            let boxed: Box<dyn Any + Send> = Box::new("boom");
            assert_eq!(panic_message(boxed.as_ref()), "boom");
            let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
            assert_eq!(panic_message(boxed.as_ref()), "bang");
            let boxed: Box<dyn Any + Send> = Box::new(7_u8);
            assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
        }
    }

    mod plan_tests {
        use super::*;

        fn config(n: usize) -> ValidationConfig {
            (0..n).fold(
                ValidationConfig::new("t").with_environment("dev", "http://x"),
                |c, i| {
                    c.with_tab(TabSpec::new(
                        format!("T{i}"),
                        Locator::id(format!("t{i}")),
                        Locator::id(format!("c{i}")),
                    ))
                },
            )
        }

        fn failed(label: &str) -> CheckOutcome {
            CheckOutcome::new(label, CheckKind::SubTab, Verdict::Failed, "x")
        }

        #[test]
        fn test_full_plan() {
            assert_eq!(plan_tabs(&config(3), &[], false), vec![0, 1, 2]);
        }

        #[test]
        fn test_retry_only_failed_tabs() {
            let previous = vec![
                failed("3.a"),
                CheckOutcome::new("1", CheckKind::MainTab, Verdict::Success, "ok"),
                failed("2"),
                failed("run"),
                failed("9"),
            ];
            assert_eq!(plan_tabs(&config(3), &previous, true), vec![1, 2]);
        }

        #[test]
        fn test_retry_without_failures_visits_all() {
            assert_eq!(plan_tabs(&config(2), &[], true), vec![0, 1]);
        }
    }

    mod traversal_tests {
        use super::*;

        fn tree() -> (ValidationConfig, ScriptedPage) {
            let mut map = std::collections::BTreeMap::new();
            map.insert("Open".to_string(), Some(2));
            let tab = TabSpec::new("Accounts", Locator::css("#accounts"), Locator::id("list"))
                .with_sub_tab(SubTabSpec::new("Open", "show('open')", Locator::css("#open")))
                .with_sub_tab(SubTabSpec::new("Closed", "show('closed')", Locator::css("#closed")))
                .with_record_column(RecordColumn::PerSubTab(map));
            let config = ValidationConfig::new("t")
                .with_environment("dev", "http://x")
                .with_tab(tab)
                .with_timing(TimingConfig::immediate());
            let controls = config.controls.clone();
            let page = ScriptedPage::new()
                .element(Locator::css("#accounts"), ScriptedElement::visible())
                .element(Locator::id("list"), ScriptedElement::visible())
                .element(Locator::css("#open"), ScriptedElement::visible())
                .element(Locator::css("#closed"), ScriptedElement::visible())
                .element(controls.table.clone(), ScriptedElement::visible())
                .row_count(controls.rows.clone(), 3)
                .element(controls.record_link(2), ScriptedElement::visible())
                .element(controls.detail_pane.clone(), ScriptedElement::visible());
            (config, page)
        }

        #[tokio::test]
        async fn test_sub_tab_labels_and_unspecified_column() {
            let (config, page) = tree();
            let state = SharedRunState::new();
            state.begin_run("dev", false).unwrap();
            let control = RunControl::new();
            let driver = ScriptedDriver::new(page);
            let summary = TraversalEngine::new(&config, &state, &control)
                .run_sequential(&driver, &[0])
                .await;
            assert!(summary.all_tabs_opened);
            assert!(!summary.stopped);

            let snap = state.snapshot();
            let entries: Vec<_> = snap
                .results
                .iter()
                .map(|o| (o.label.as_str(), o.kind, o.verdict))
                .collect();
            assert_eq!(
                entries,
                [
                    ("1", CheckKind::MainTab, Verdict::Success),
                    ("1.a", CheckKind::SubTab, Verdict::Success),
                    ("1.a", CheckKind::RecordWorkflow, Verdict::Success),
                    ("1.b", CheckKind::SubTab, Verdict::Success),
                    ("1.b", CheckKind::RecordWorkflow, Verdict::Skipped),
                ]
            );
            assert_eq!(snap.progress_percent, 95);
        }

        #[tokio::test]
        async fn test_panic_inside_node_is_contained() {
            let (config, page) = tree();
            let page = page.element(
                Locator::css("#accounts"),
                ScriptedElement::visible().on_click(|| panic!("renderer crashed")),
            );
            let state = SharedRunState::new();
            state.begin_run("dev", false).unwrap();
            let control = RunControl::new();
            let driver = ScriptedDriver::new(page);
            let summary = TraversalEngine::new(&config, &state, &control)
                .run_sequential(&driver, &[0])
                .await;
            assert!(!summary.all_tabs_opened);
            let snap = state.snapshot();
            assert_eq!(snap.failed, 1);
            assert_eq!(snap.skipped, 0);
            assert_eq!(snap.results[0].verdict, Verdict::Failed);
            assert!(snap.results[0]
                .message
                .contains("Unexpected error while processing Tab 'Accounts': renderer crashed"));
        }

        #[tokio::test]
        async fn test_empty_session_list() {
            let (config, _) = tree();
            let state = SharedRunState::new();
            let control = RunControl::new();
            let summary = TraversalEngine::new(&config, &state, &control)
                .run::<ScriptedDriver>(&[], &[0])
                .await;
            assert!(!summary.all_tabs_opened);
            assert_eq!(summary.tabs_visited, 0);
        }
    }
}
