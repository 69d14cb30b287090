//! Scripted in-memory automation runtime.
//!
//! [`ScriptedDriver`] plays back a [`ScriptedPage`]: which locators resolve,
//! whether they are visible or clickable, how many times a lookup or click
//! fails with a stale reference before succeeding, row counts, and script
//! results. Every call is appended to a history for later verification.
//!
//! ```
//! use tabwalk::mock::{ScriptedDriver, ScriptedElement, ScriptedPage};
//! use tabwalk::Locator;
//!
//! let page = ScriptedPage::new()
//!     .element(Locator::css("#accounts"), ScriptedElement::visible())
//!     .row_count(Locator::css("tr"), 4);
//! let driver = ScriptedDriver::new(page);
//! assert!(driver.history().is_empty());
//! ```

use crate::config::BrowserConfig;
use crate::driver::{AutomationDriver, DriverFactory, ElementHandle};
use crate::locator::{Locator, WaitCondition};
use crate::result::{TabwalkError, TabwalkResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Callback run after a scripted element is clicked
pub type ClickHook = Arc<dyn Fn() + Send + Sync>;

/// Behaviour of one scripted element
#[derive(Clone)]
pub struct ScriptedElement {
    /// Rendered with a non-empty box
    pub visible: bool,
    /// Enabled for input
    pub clickable: bool,
    /// Lookups that fail stale before one succeeds
    pub stale_lookups: u32,
    /// Clicks that fail stale before one succeeds
    pub stale_clicks: u32,
    /// Script-driven clicks raise a script error
    pub script_click_fails: bool,
    on_click: Option<ClickHook>,
}

impl fmt::Debug for ScriptedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedElement")
            .field("visible", &self.visible)
            .field("clickable", &self.clickable)
            .field("stale_lookups", &self.stale_lookups)
            .field("stale_clicks", &self.stale_clicks)
            .field("script_click_fails", &self.script_click_fails)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

impl ScriptedElement {
    /// Visible, clickable element
    #[must_use]
    pub fn visible() -> Self {
        Self {
            visible: true,
            clickable: true,
            stale_lookups: 0,
            stale_clicks: 0,
            script_click_fails: false,
            on_click: None,
        }
    }

    /// Attached but not rendered
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            visible: false,
            clickable: false,
            ..Self::visible()
        }
    }

    /// Rendered but disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            clickable: false,
            ..Self::visible()
        }
    }

    /// Fail the first `count` lookups with a stale reference
    #[must_use]
    pub const fn with_stale_lookups(mut self, count: u32) -> Self {
        self.stale_lookups = count;
        self
    }

    /// Fail the first `count` clicks with a stale reference
    #[must_use]
    pub const fn with_stale_clicks(mut self, count: u32) -> Self {
        self.stale_clicks = count;
        self
    }

    /// Make script-driven clicks fail so the native click is used
    #[must_use]
    pub const fn with_script_click_failure(mut self) -> Self {
        self.script_click_fails = true;
        self
    }

    /// Run `hook` after every successful click
    #[must_use]
    pub fn on_click(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_click = Some(Arc::new(hook));
        self
    }
}

/// Page contents played back by a [`ScriptedDriver`]
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    elements: HashMap<Locator, ScriptedElement>,
    rows: HashMap<Locator, usize>,
    scripts: HashMap<String, Result<serde_json::Value, String>>,
    ready_state: String,
    navigation_failures: u32,
    screenshot_fails: bool,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self {
            elements: HashMap::new(),
            rows: HashMap::new(),
            scripts: HashMap::new(),
            ready_state: "complete".to_string(),
            navigation_failures: 0,
            screenshot_fails: false,
        }
    }
}

impl ScriptedPage {
    /// Empty page whose document is ready
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an element
    #[must_use]
    pub fn element(mut self, locator: Locator, element: ScriptedElement) -> Self {
        self.elements.insert(locator, element);
        self
    }

    /// Set the number of rows matched by a locator
    #[must_use]
    pub fn row_count(mut self, locator: Locator, rows: usize) -> Self {
        self.rows.insert(locator, rows);
        self
    }

    /// Result returned when `code` is executed
    #[must_use]
    pub fn script(mut self, code: impl Into<String>, value: serde_json::Value) -> Self {
        self.scripts.insert(code.into(), Ok(value));
        self
    }

    /// Error raised when `code` is executed
    #[must_use]
    pub fn script_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.scripts.insert(code.into(), Err(message.into()));
        self
    }

    /// Value reported for `document.readyState`
    #[must_use]
    pub fn ready_state(mut self, state: impl Into<String>) -> Self {
        self.ready_state = state.into();
        self
    }

    /// Fail the first `count` navigations
    #[must_use]
    pub const fn navigation_failures(mut self, count: u32) -> Self {
        self.navigation_failures = count;
        self
    }

    /// Make every screenshot fail
    #[must_use]
    pub const fn failing_screenshots(mut self) -> Self {
        self.screenshot_fails = true;
        self
    }
}

#[derive(Debug)]
struct SessionState {
    page: ScriptedPage,
    history: Vec<String>,
    closed: bool,
}

/// In-memory session over a [`ScriptedPage`]
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    inner: Arc<Mutex<SessionState>>,
}

impl ScriptedDriver {
    /// Create a session playing back `page`
    #[must_use]
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                page,
                history: Vec::new(),
                closed: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if a call starting with `prefix` was made
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.state().history.iter().any(|c| c.starts_with(prefix))
    }

    /// Count calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.state()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn record(&self, call: String) {
        self.state().history.push(call);
    }

    fn press(&self, element: &ElementHandle, scripted: bool) -> TabwalkResult<()> {
        let hook = {
            let mut state = self.state();
            let kind = if scripted { "script_click" } else { "click" };
            state.history.push(format!("{kind}:{}", element.locator));
            let Some(target) = state.page.elements.get_mut(&element.locator) else {
                return Err(TabwalkError::StaleElement {
                    locator: element.locator.to_string(),
                    message: "element is no longer attached".into(),
                });
            };
            if target.stale_clicks > 0 {
                target.stale_clicks -= 1;
                return Err(TabwalkError::StaleElement {
                    locator: element.locator.to_string(),
                    message: "element was re-rendered".into(),
                });
            }
            if scripted && target.script_click_fails {
                return Err(TabwalkError::script("click() is not a function"));
            }
            target.on_click.clone()
        };
        // Lock released: hooks may call back into the run.
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> TabwalkResult<()> {
        let mut state = self.state();
        state.history.push(format!("navigate:{url}"));
        if state.page.navigation_failures > 0 {
            state.page.navigation_failures -= 1;
            return Err(TabwalkError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        Ok(())
    }

    async fn ready_state(&self) -> TabwalkResult<String> {
        let mut state = self.state();
        state.history.push("ready_state".into());
        Ok(state.page.ready_state.clone())
    }

    async fn find_element(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> TabwalkResult<ElementHandle> {
        let mut state = self.state();
        state.history.push(format!("find:{locator}"));
        let not_found = || TabwalkError::NotFound {
            locator: locator.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
        let element = state.page.elements.get_mut(locator).ok_or_else(not_found)?;
        if element.stale_lookups > 0 {
            element.stale_lookups -= 1;
            return Err(TabwalkError::StaleElement {
                locator: locator.to_string(),
                message: "element was re-rendered".into(),
            });
        }
        let satisfied = match condition {
            WaitCondition::Present => true,
            WaitCondition::Visible => element.visible,
            WaitCondition::Clickable => element.visible && element.clickable,
        };
        if satisfied {
            Ok(ElementHandle::new(locator.to_string(), locator.clone()))
        } else {
            Err(not_found())
        }
    }

    async fn current_rows(&self, locator: &Locator) -> TabwalkResult<usize> {
        let mut state = self.state();
        state.history.push(format!("rows:{locator}"));
        Ok(state.page.rows.get(locator).copied().unwrap_or(0))
    }

    async fn click(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.press(element, false)
    }

    async fn script_click(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.press(element, true)
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.record(format!("scroll:{}", element.locator));
        Ok(())
    }

    async fn highlight(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.record(format!("highlight:{}", element.locator));
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> TabwalkResult<serde_json::Value> {
        let mut state = self.state();
        state.history.push(format!("script:{script}"));
        match state.page.scripts.get(script) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(TabwalkError::script(message.clone())),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn go_back(&self) -> TabwalkResult<()> {
        self.record("back".into());
        Ok(())
    }

    async fn refresh(&self) -> TabwalkResult<()> {
        self.record("refresh".into());
        Ok(())
    }

    async fn screenshot(&self) -> TabwalkResult<Vec<u8>> {
        let mut state = self.state();
        state.history.push("screenshot".into());
        if state.page.screenshot_fails {
            return Err(TabwalkError::Screenshot {
                message: "capture unavailable".into(),
            });
        }
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn close(&self) -> TabwalkResult<()> {
        let mut state = self.state();
        state.history.push("close".into());
        state.closed = true;
        Ok(())
    }
}

/// Factory handing out [`ScriptedDriver`] sessions over one page script
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    page: ScriptedPage,
    launch_error: Option<String>,
    sessions: Arc<Mutex<Vec<ScriptedDriver>>>,
}

impl ScriptedFactory {
    /// Every launch plays back its own copy of `page`
    #[must_use]
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            launch_error: None,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every launch fails with `message`
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            launch_error: Some(message.into()),
            ..Self::new(ScriptedPage::new())
        }
    }

    /// Sessions launched so far
    #[must_use]
    pub fn sessions(&self) -> Vec<ScriptedDriver> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    async fn launch(&self, _config: &BrowserConfig) -> TabwalkResult<ScriptedDriver> {
        if let Some(message) = &self.launch_error {
            return Err(TabwalkError::BrowserLaunch {
                message: message.clone(),
            });
        }
        let driver = ScriptedDriver::new(self.page.clone());
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(driver.clone());
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_millis(10);

    mod lookup_tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_element_not_found() {
            let driver = ScriptedDriver::new(ScriptedPage::new());
            let err = driver
                .find_element(&Locator::css("#x"), WaitCondition::Present, WAIT)
                .await
                .unwrap_err();
            assert!(err.is_absence());
            assert!(driver.was_called("find:css=#x"));
        }

        #[tokio::test]
        async fn test_hidden_element_fails_visibility() {
            let locator = Locator::css("#panel");
            let driver = ScriptedDriver::new(
                ScriptedPage::new().element(locator.clone(), ScriptedElement::hidden()),
            );
            assert!(driver
                .find_element(&locator, WaitCondition::Present, WAIT)
                .await
                .is_ok());
            assert!(driver
                .find_element(&locator, WaitCondition::Visible, WAIT)
                .await
                .unwrap_err()
                .is_absence());
        }

        #[tokio::test]
        async fn test_disabled_element_not_clickable() {
            let locator = Locator::css("#btn");
            let driver = ScriptedDriver::new(
                ScriptedPage::new().element(locator.clone(), ScriptedElement::disabled()),
            );
            assert!(driver
                .find_element(&locator, WaitCondition::Clickable, WAIT)
                .await
                .is_err());
        }

        #[tokio::test]
        async fn test_stale_lookups_count_down() {
            let locator = Locator::id("tab");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().with_stale_lookups(1),
            ));
            let first = driver.find_element(&locator, WaitCondition::Visible, WAIT).await;
            assert!(first.unwrap_err().is_stale());
            let second = driver.find_element(&locator, WaitCondition::Visible, WAIT).await;
            assert_eq!(second.unwrap().locator, locator);
        }
    }

    mod click_tests {
        use super::*;

        #[tokio::test]
        async fn test_click_runs_hook() {
            let clicks = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&clicks);
            let locator = Locator::css("#go");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().on_click(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            ));
            let handle = ElementHandle::new("go", locator);
            driver.script_click(&handle).await.unwrap();
            driver.click(&handle).await.unwrap();
            assert_eq!(clicks.load(Ordering::SeqCst), 2);
            assert_eq!(driver.call_count("script_click:"), 1);
            assert_eq!(driver.call_count("click:"), 1);
        }

        #[tokio::test]
        async fn test_stale_click() {
            let locator = Locator::css("#go");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().with_stale_clicks(1),
            ));
            let handle = ElementHandle::new("go", locator);
            assert!(driver.click(&handle).await.unwrap_err().is_stale());
            assert!(driver.click(&handle).await.is_ok());
        }

        #[tokio::test]
        async fn test_script_click_failure() {
            let locator = Locator::css("#go");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().with_script_click_failure(),
            ));
            let handle = ElementHandle::new("go", locator);
            assert!(matches!(
                driver.script_click(&handle).await,
                Err(TabwalkError::Script { .. })
            ));
            assert!(driver.click(&handle).await.is_ok());
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn test_scripts_and_rows() {
            let driver = ScriptedDriver::new(
                ScriptedPage::new()
                    .script("a()", serde_json::json!(7))
                    .script_error("b()", "b is not defined")
                    .row_count(Locator::css("tr"), 3),
            );
            assert_eq!(driver.execute_script("a()").await.unwrap(), serde_json::json!(7));
            assert!(driver.execute_script("b()").await.is_err());
            assert_eq!(driver.execute_script("c()").await.unwrap(), serde_json::Value::Null);
            assert_eq!(driver.current_rows(&Locator::css("tr")).await.unwrap(), 3);
            assert_eq!(driver.current_rows(&Locator::css("li")).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_navigation_failures_then_success() {
            let driver = ScriptedDriver::new(ScriptedPage::new().navigation_failures(1));
            assert!(driver.navigate("http://a").await.is_err());
            assert!(driver.navigate("http://a").await.is_ok());
            assert_eq!(driver.call_count("navigate:"), 2);
        }

        #[tokio::test]
        async fn test_close_marks_session() {
            let driver = ScriptedDriver::new(ScriptedPage::new());
            assert!(!driver.is_closed());
            driver.close().await.unwrap();
            assert!(driver.is_closed());
        }

        #[tokio::test]
        async fn test_factory_tracks_sessions() {
            let factory = ScriptedFactory::new(ScriptedPage::new());
            let config = BrowserConfig::default();
            factory.launch(&config).await.unwrap();
            factory.launch(&config).await.unwrap();
            assert_eq!(factory.sessions().len(), 2);

            let failing = ScriptedFactory::failing("no chromium");
            assert!(matches!(
                failing.launch(&config).await,
                Err(TabwalkError::BrowserLaunch { .. })
            ));
        }
    }
}
