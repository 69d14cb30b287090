//! Declarative validation configuration.
//!
//! One document describes the environments, the browser session, timing
//! budgets, the shared list/detail control locators and the ordered tab tree.
//! YAML and JSON are both accepted; the format is chosen by file extension.

use crate::locator::Locator;
use crate::result::{TabwalkError, TabwalkResult};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Placeholder substituted with the record column in the record-link template
pub const COLUMN_PLACEHOLDER: &str = "{column}";

/// Default list table locator
pub const DEFAULT_TABLE_CSS: &str = "table.ListView";

/// Default row locator (header row included)
pub const DEFAULT_ROWS_XPATH: &str = "//table[@class='ListView']/tbody/tr";

/// Default record link template; row 2 is the first data row
pub const DEFAULT_RECORD_LINK_XPATH: &str = "//table[@class='ListView']/tbody/tr[2]/td[{column}]/a";

// =============================================================================
// TAB TREE
// =============================================================================

/// Which table column holds the clickable record link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordColumn {
    /// Same column for every sub-tab (or for the tab itself when it has none)
    Single(u32),
    /// Column per sub-tab name; `null` marks a sub-tab as not specified
    PerSubTab(BTreeMap<String, Option<u32>>),
}

/// Record column resolved for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnResolution {
    /// The tab declares no record workflow at all
    NotConfigured,
    /// The tab declares record columns, but none for this node
    Unspecified,
    /// Column index (1-based)
    Column(u32),
}

/// One sub-tab, activated by an in-page script rather than a click
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTabSpec {
    /// Name, unique within the owning tab
    pub name: String,
    /// In-page navigation action, executed as JavaScript
    pub activation_trigger: String,
    /// Element whose visibility confirms the panel rendered
    pub content_probe: Locator,
}

impl SubTabSpec {
    /// Create a sub-tab spec
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        activation_trigger: impl Into<String>,
        content_probe: Locator,
    ) -> Self {
        Self {
            name: name.into(),
            activation_trigger: activation_trigger.into(),
            content_probe,
        }
    }
}

/// One main tab of the configured tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSpec {
    /// Name, unique within the tree
    pub name: String,
    /// Element clicked to open the tab
    pub activation_target: Locator,
    /// Element whose visibility confirms the tab rendered
    pub content_probe: Locator,
    /// Ordered sub-tabs; when present, never empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tabs: Option<Vec<SubTabSpec>>,
    /// Record column for the first-record workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_column: Option<RecordColumn>,
}

impl TabSpec {
    /// Create a tab without sub-tabs or record workflow
    #[must_use]
    pub fn new(name: impl Into<String>, activation_target: Locator, content_probe: Locator) -> Self {
        Self {
            name: name.into(),
            activation_target,
            content_probe,
            sub_tabs: None,
            record_column: None,
        }
    }

    /// Append a sub-tab
    #[must_use]
    pub fn with_sub_tab(mut self, sub_tab: SubTabSpec) -> Self {
        self.sub_tabs.get_or_insert_with(Vec::new).push(sub_tab);
        self
    }

    /// Set the record column
    #[must_use]
    pub fn with_record_column(mut self, column: RecordColumn) -> Self {
        self.record_column = Some(column);
        self
    }

    /// Sub-tabs in declared order
    #[must_use]
    pub fn sub_tabs(&self) -> &[SubTabSpec] {
        self.sub_tabs.as_deref().unwrap_or_default()
    }

    /// Resolve the record column for a sub-tab
    #[must_use]
    pub fn record_column_for(&self, sub_tab: &str) -> ColumnResolution {
        match &self.record_column {
            None => ColumnResolution::NotConfigured,
            Some(RecordColumn::Single(column)) => ColumnResolution::Column(*column),
            Some(RecordColumn::PerSubTab(map)) => match map.get(sub_tab) {
                Some(Some(column)) => ColumnResolution::Column(*column),
                _ => ColumnResolution::Unspecified,
            },
        }
    }

    /// Record column for a tab that has no sub-tabs
    #[must_use]
    pub fn own_record_column(&self) -> Option<u32> {
        match self.record_column {
            Some(RecordColumn::Single(column)) if self.sub_tabs().is_empty() => Some(column),
            _ => None,
        }
    }

    fn validate(&self) -> TabwalkResult<()> {
        if self.name.trim().is_empty() {
            return Err(TabwalkError::config("tab name must not be empty"));
        }
        if let Some(subs) = &self.sub_tabs {
            if subs.is_empty() {
                return Err(TabwalkError::config(format!(
                    "tab '{}' declares sub_tabs but lists none",
                    self.name
                )));
            }
            let mut seen = HashSet::new();
            for sub in subs {
                if !seen.insert(sub.name.as_str()) {
                    return Err(TabwalkError::config(format!(
                        "duplicate sub-tab '{}' in tab '{}'",
                        sub.name, self.name
                    )));
                }
            }
        }
        match &self.record_column {
            Some(RecordColumn::Single(0)) => Err(TabwalkError::config(format!(
                "tab '{}': record_column is 1-based",
                self.name
            ))),
            Some(RecordColumn::PerSubTab(map)) => {
                for (sub, column) in map {
                    if !self.sub_tabs().iter().any(|s| &s.name == sub) {
                        return Err(TabwalkError::config(format!(
                            "tab '{}': record_column names unknown sub-tab '{sub}'",
                            self.name
                        )));
                    }
                    if *column == Some(0) {
                        return Err(TabwalkError::config(format!(
                            "tab '{}': record_column for '{sub}' is 1-based",
                            self.name
                        )));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// SESSION SETTINGS
// =============================================================================

/// Browser session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Chromium executable; discovered automatically when unset
    pub executable: Option<PathBuf>,
    /// Keep the Chromium sandbox enabled
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            executable: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set the Chromium executable
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Disable the sandbox (containers)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Retry budgets, wait windows and pacing delays, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Attempts for required element lookups
    pub lookup_attempts: u32,
    /// Wait window per lookup attempt
    pub lookup_timeout_ms: u64,
    /// Sleep between stale retries
    pub retry_interval_ms: u64,
    /// Attempts for clicks
    pub click_attempts: u32,
    /// Pause after a successful click
    pub post_click_delay_ms: u64,
    /// Wait window for content probes and the detail pane
    pub content_timeout_ms: u64,
    /// Wait window for the list table
    pub table_timeout_ms: u64,
    /// Attempts for the first-record link
    pub record_link_attempts: u32,
    /// Wait window for the first-record link
    pub record_link_timeout_ms: u64,
    /// Attempts for optional controls (Search, Add, Cancel)
    pub optional_control_attempts: u32,
    /// Wait window for optional controls
    pub optional_control_timeout_ms: u64,
    /// Attempts to load the environment URL
    pub navigation_attempts: u32,
    /// Wait window for `document.readyState == "complete"`
    pub ready_timeout_ms: u64,
    /// Sleep between navigation attempts
    pub navigation_retry_delay_ms: u64,
    /// Settling delay between main tabs
    pub settle_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lookup_attempts: 3,
            lookup_timeout_ms: 5_000,
            retry_interval_ms: 1_000,
            click_attempts: 3,
            post_click_delay_ms: 1_000,
            content_timeout_ms: 5_000,
            table_timeout_ms: 10_000,
            record_link_attempts: 2,
            record_link_timeout_ms: 3_000,
            optional_control_attempts: 2,
            optional_control_timeout_ms: 2_000,
            navigation_attempts: 3,
            ready_timeout_ms: 10_000,
            navigation_retry_delay_ms: 2_000,
            settle_delay_ms: 2_000,
        }
    }
}

impl TimingConfig {
    /// Same budgets with every sleep removed and short waits (scripted runtimes)
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            lookup_timeout_ms: 50,
            retry_interval_ms: 0,
            post_click_delay_ms: 0,
            content_timeout_ms: 50,
            table_timeout_ms: 50,
            record_link_timeout_ms: 50,
            optional_control_timeout_ms: 50,
            ready_timeout_ms: 50,
            navigation_retry_delay_ms: 0,
            settle_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Policy for required elements (tab targets, content probes)
    #[must_use]
    pub fn element_lookup(&self) -> RetryPolicy {
        RetryPolicy::new(self.lookup_attempts, ms(self.lookup_timeout_ms))
            .with_retry_interval(ms(self.retry_interval_ms))
    }

    /// Policy for content probes and the detail pane
    #[must_use]
    pub fn content_probe(&self) -> RetryPolicy {
        RetryPolicy::new(self.lookup_attempts, ms(self.content_timeout_ms))
            .with_retry_interval(ms(self.retry_interval_ms))
    }

    /// Policy for the list table
    #[must_use]
    pub fn table(&self) -> RetryPolicy {
        RetryPolicy::new(self.lookup_attempts, ms(self.table_timeout_ms))
            .with_retry_interval(ms(self.retry_interval_ms))
    }

    /// Reduced policy for the first-record link
    #[must_use]
    pub fn record_link(&self) -> RetryPolicy {
        RetryPolicy::new(self.record_link_attempts, ms(self.record_link_timeout_ms))
            .with_retry_interval(ms(self.retry_interval_ms))
    }

    /// Short policy for optional controls
    #[must_use]
    pub fn optional_control(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.optional_control_attempts,
            ms(self.optional_control_timeout_ms),
        )
        .with_retry_interval(ms(self.retry_interval_ms))
    }

    /// Pause after a successful click
    #[must_use]
    pub const fn post_click_delay(&self) -> Duration {
        ms(self.post_click_delay_ms)
    }

    /// Sleep between stale click retries
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        ms(self.retry_interval_ms)
    }

    /// Settling delay between main tabs
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        ms(self.settle_delay_ms)
    }

    /// Ready-state wait window
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        ms(self.ready_timeout_ms)
    }

    /// Sleep between navigation attempts
    #[must_use]
    pub const fn navigation_retry_delay(&self) -> Duration {
        ms(self.navigation_retry_delay_ms)
    }
}

const fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Shared list/detail controls used by the record workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLocators {
    /// Results table
    pub table: Locator,
    /// Table rows, header included
    pub rows: Locator,
    /// XPath template for the first-record link; `{column}` is substituted
    pub record_link: String,
    /// Detail pane shown after opening a record
    pub detail_pane: Locator,
    /// Optional Search control
    pub search: Locator,
    /// Optional Add control
    pub add: Locator,
    /// Optional Cancel control
    pub cancel: Locator,
}

impl Default for ControlLocators {
    fn default() -> Self {
        Self {
            table: Locator::css(DEFAULT_TABLE_CSS),
            rows: Locator::xpath(DEFAULT_ROWS_XPATH),
            record_link: DEFAULT_RECORD_LINK_XPATH.to_string(),
            detail_pane: Locator::css("div#content"),
            search: Locator::xpath("//img[contains(@src,'btn_search')]"),
            add: Locator::xpath("//img[contains(@src,'btn_add')]"),
            cancel: Locator::xpath("//img[contains(@src,'btn_cancel')]"),
        }
    }
}

impl ControlLocators {
    /// Link in the given column of the first data row
    #[must_use]
    pub fn record_link(&self, column: u32) -> Locator {
        Locator::xpath(
            self.record_link
                .replace(COLUMN_PLACEHOLDER, &column.to_string()),
        )
    }
}

/// Traversal scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One session, tabs strictly in order
    #[default]
    Sequential,
    /// One session per worker, tabs pulled from a shared queue
    Parallel,
}

/// Execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Scheduling mode
    pub mode: ExecutionMode,
    /// Worker sessions in parallel mode
    pub workers: usize,
    /// Open and cancel the Add form on every main tab where it exists
    pub exercise_add_control: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            workers: 3,
            exercise_add_control: true,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Screenshot root; each run writes into `<dir>/<run_id>/`
    pub screenshots_dir: PathBuf,
    /// Saved HTML reports
    pub reports_dir: PathBuf,
    /// Log directory
    pub log_dir: PathBuf,
    /// Capture screenshots at all
    pub capture_screenshots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("screenshots"),
            reports_dir: PathBuf::from("reports"),
            log_dir: PathBuf::from("logs"),
            capture_screenshots: true,
        }
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// Full validation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Project name shown in reports
    #[serde(default = "default_project_name")]
    pub project_name: String,
    /// Environment name to base URL
    pub environments: BTreeMap<String, String>,
    /// Browser session
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Timing budgets
    #[serde(default)]
    pub timing: TimingConfig,
    /// Shared list/detail controls
    #[serde(default)]
    pub controls: ControlLocators,
    /// Scheduling
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,
    /// Ordered tab tree
    pub tabs: Vec<TabSpec>,
}

fn default_project_name() -> String {
    "Tabwalk".to_string()
}

impl ValidationConfig {
    /// Create an empty configuration
    #[must_use]
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            environments: BTreeMap::new(),
            browser: BrowserConfig::default(),
            timing: TimingConfig::default(),
            controls: ControlLocators::default(),
            execution: ExecutionConfig::default(),
            output: OutputConfig::default(),
            tabs: Vec::new(),
        }
    }

    /// Add an environment
    #[must_use]
    pub fn with_environment(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.environments.insert(name.into(), url.into());
        self
    }

    /// Append a tab
    #[must_use]
    pub fn with_tab(mut self, tab: TabSpec) -> Self {
        self.tabs.push(tab);
        self
    }

    /// Replace timing budgets
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Replace execution settings
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Replace output settings
    #[must_use]
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Load and validate a configuration file (`.json`, `.yaml` or `.yml`)
    pub fn from_path(path: impl AsRef<Path>) -> TabwalkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(text: &str) -> TabwalkResult<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(text: &str) -> TabwalkResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants of the document
    pub fn validate(&self) -> TabwalkResult<()> {
        if self.environments.is_empty() {
            return Err(TabwalkError::config("at least one environment is required"));
        }
        if self.tabs.is_empty() {
            return Err(TabwalkError::config("at least one tab is required"));
        }
        if !self.controls.record_link.contains(COLUMN_PLACEHOLDER) {
            return Err(TabwalkError::config(format!(
                "controls.record_link must contain {COLUMN_PLACEHOLDER}"
            )));
        }
        if self.execution.mode == ExecutionMode::Parallel && self.execution.workers == 0 {
            return Err(TabwalkError::config("parallel mode needs at least one worker"));
        }
        let mut seen = HashSet::new();
        for tab in &self.tabs {
            if !seen.insert(tab.name.as_str()) {
                return Err(TabwalkError::config(format!("duplicate tab '{}'", tab.name)));
            }
            tab.validate()?;
        }
        Ok(())
    }

    /// Base URL for an environment
    pub fn base_url(&self, environment: &str) -> TabwalkResult<&str> {
        self.environments
            .get(environment)
            .map(String::as_str)
            .ok_or_else(|| TabwalkError::UnknownEnvironment {
                name: environment.to_string(),
            })
    }
}
