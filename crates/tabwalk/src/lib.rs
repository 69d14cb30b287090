//! Tabwalk: retry-tolerant tab/sub-tab traversal for browser-driven UI
//! regression checks.
//!
//! A run loads an environment's start page, then walks a declared tree of
//! main tabs and sub-tabs. Each node is opened and its content probed; list
//! views additionally open their first record and cancel back out. Every
//! interaction becomes a [`CheckOutcome`] in the shared [`RunState`], which a
//! control surface polls while the run can be paused, resumed or stopped at
//! node boundaries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   start/pause/stop   ┌──────────────────┐
//! │ Control surface  │ ───────────────────► │ ValidationRunner │
//! │ (CLI / HTTP)     │ ◄─── snapshots ───── │  (worker task)   │
//! └──────────────────┘                      └────────┬─────────┘
//!                                                    │
//!                                           ┌────────▼─────────┐
//!                                           │ TraversalEngine  │
//!                                           └────────┬─────────┘
//!                                                    │ Interactor + retry
//!                                           ┌────────▼─────────┐
//!                                           │ AutomationDriver │
//!                                           │ (Chromium / mock)│
//!                                           └──────────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod capture;
mod config;
mod control;
mod driver;
mod engine;
mod interaction;
mod locator;
mod report;
mod result;
mod retry;
mod runner;
mod state;

#[cfg(feature = "browser")]
mod browser;

/// Scriptable in-memory automation runtime for tests
pub mod mock;

pub use capture::{sanitize, ScreenshotStore};
pub use config::{
    BrowserConfig, ColumnResolution, ControlLocators, ExecutionConfig, ExecutionMode,
    OutputConfig, RecordColumn, SubTabSpec, TabSpec, TimingConfig, ValidationConfig,
    COLUMN_PLACEHOLDER, DEFAULT_RECORD_LINK_XPATH, DEFAULT_ROWS_XPATH, DEFAULT_TABLE_CSS,
};
pub use control::{ControlSignal, Flow, RunControl};
pub use driver::{AutomationDriver, DriverFactory, ElementHandle};
pub use engine::{
    plan_tabs, sub_tab_letter, tab_label, TraversalEngine, TraversalSummary,
    SESSION_READY_PROGRESS,
};
pub use interaction::Interactor;
pub use locator::{Locator, Query, WaitCondition};
pub use report::{escape_html, ComponentStats, RunReport};
pub use result::{TabwalkError, TabwalkResult};
pub use retry::{click_with_retry, locate_with_retry, navigate_with_retry, RetryPolicy};
pub use runner::{RunRequest, ValidationRunner};
pub use state::{
    CheckKind, CheckOutcome, OutcomeSink, RunState, RunStatus, SharedRunState, TabBuffer,
    Verdict, RUN_LABEL,
};

#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumFactory};
