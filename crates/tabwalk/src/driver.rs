//! Automation runtime capability.
//!
//! Everything the traversal needs from a browser session goes through
//! [`AutomationDriver`]. Two implementations ship with the crate:
//!
//! - [`crate::ChromiumDriver`] (feature `browser`), CDP via chromiumoxide
//! - [`crate::mock::ScriptedDriver`], an in-memory page for tests
//!
//! All methods take `&self` so a session can be shared by reference with the
//! retry helpers and interaction primitives for the whole run.

use crate::config::BrowserConfig;
use crate::locator::{Locator, WaitCondition};
use crate::result::TabwalkResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Handle to an element resolved by a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-specific identifier
    pub id: String,
    /// Locator the element was resolved from
    pub locator: Locator,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
        }
    }
}

/// Capability interface over one browser session
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Navigate to URL
    async fn navigate(&self, url: &str) -> TabwalkResult<()>;

    /// Current `document.readyState`
    async fn ready_state(&self) -> TabwalkResult<String>;

    /// Wait up to `timeout` for an element satisfying `condition`.
    ///
    /// Returns `NotFound` when the window elapses and `StaleElement` when the
    /// node matched but was detached while being inspected.
    async fn find_element(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> TabwalkResult<ElementHandle>;

    /// Number of rows currently matched by `locator`, header included
    async fn current_rows(&self, locator: &Locator) -> TabwalkResult<usize>;

    /// Native (input-event) click
    async fn click(&self, element: &ElementHandle) -> TabwalkResult<()>;

    /// Script-driven `element.click()`
    async fn script_click(&self, element: &ElementHandle) -> TabwalkResult<()>;

    /// Scroll the element into the viewport
    async fn scroll_into_view(&self, element: &ElementHandle) -> TabwalkResult<()>;

    /// Outline the element for an operator watching the session
    async fn highlight(&self, element: &ElementHandle) -> TabwalkResult<()>;

    /// Execute JavaScript in page context
    async fn execute_script(&self, script: &str) -> TabwalkResult<serde_json::Value>;

    /// Go back in history
    async fn go_back(&self) -> TabwalkResult<()>;

    /// Reload page
    async fn refresh(&self) -> TabwalkResult<()>;

    /// Capture the viewport as PNG bytes
    async fn screenshot(&self) -> TabwalkResult<Vec<u8>>;

    /// Close the session
    async fn close(&self) -> TabwalkResult<()>;
}

/// Launches browser sessions for a run
#[async_trait]
pub trait DriverFactory: Send + Sync + 'static {
    /// Session type produced by this factory
    type Driver: AutomationDriver + 'static;

    /// Launch one session
    async fn launch(&self, config: &BrowserConfig) -> TabwalkResult<Self::Driver>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_handle_new() {
        let handle = ElementHandle::new("el-1", Locator::css("#tab"));
        assert_eq!(handle.id, "el-1");
        assert_eq!(handle.locator, Locator::css("#tab"));
    }

    #[test]
    fn test_element_handle_serializes() {
        let handle = ElementHandle::new("el-2", Locator::id("x"));
        let json = serde_json::to_string(&handle).unwrap();
        assert!(json.contains("\"id\":\"el-2\""));
        assert!(json.contains("\"locator\":{\"id\":\"x\"}"));
    }
}
