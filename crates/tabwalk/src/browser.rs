//! Chromium sessions over CDP.
//!
//! Resolved elements are kept in a per-session registry keyed by the id in
//! their [`ElementHandle`]. Handles do not survive a navigation or reload:
//! the registry is cleared and later use reports `StaleElement`, the same
//! as a node that was detached by a re-render. In-page changes (sub-tab
//! scripts, anchor clicks) keep the document, so the registry is also
//! bounded and drops its oldest handles first.

#![allow(clippy::missing_errors_doc, clippy::significant_drop_tightening)]

use crate::config::BrowserConfig;
use crate::driver::{AutomationDriver, DriverFactory, ElementHandle};
use crate::locator::{Locator, Query, WaitCondition};
use crate::result::{TabwalkError, TabwalkResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Elements kept per session before the oldest handles are released
const MAX_REGISTERED_ELEMENTS: usize = 256;

const HANDLE_PREFIX: &str = "el-";

const IS_PRESENT: &str = "function() { return this.isConnected; }";

const IS_VISIBLE: &str = "function() {
    if (!this.isConnected) return false;
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}";

const IS_CLICKABLE: &str = "function() {
    if (!this.isConnected || this.disabled) return false;
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none'
        && style.pointerEvents !== 'none';
}";

const SCRIPT_CLICK: &str = "function() { if (!this.isConnected) return false; this.click(); return true; }";

const SCROLL_INTO_VIEW: &str =
    "function() { if (!this.isConnected) return false; this.scrollIntoView({block: 'center'}); return true; }";

const HIGHLIGHT: &str =
    "function() { if (!this.isConnected) return false; this.style.outline = '3px solid #f44336'; return true; }";

/// Launches [`ChromiumDriver`] sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumFactory;

#[async_trait]
impl DriverFactory for ChromiumFactory {
    type Driver = ChromiumDriver;

    async fn launch(&self, config: &BrowserConfig) -> TabwalkResult<ChromiumDriver> {
        ChromiumDriver::launch(config).await
    }
}

/// One Chromium browser with a single page
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<CdpBrowser>,
    page: CdpPage,
    handler: tokio::task::JoinHandle<()>,
    elements: Mutex<BTreeMap<u64, Arc<Element>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("elements", &self.registry().len())
            .finish_non_exhaustive()
    }
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page
    pub async fn launch(config: &BrowserConfig) -> TabwalkResult<Self> {
        let mut builder = CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(ref path) = config.executable {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|message| TabwalkError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| TabwalkError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(TabwalkError::BrowserLaunch {
                    message: format!("could not open page: {e}"),
                });
            }
        };
        tracing::info!(headless = config.headless, "chromium session launched");

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler,
            elements: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn registry(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Element>>> {
        self.elements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, locator: &Locator, element: Element) -> ElementHandle {
        let key = self.next_id.fetch_add(1, Ordering::Relaxed);
        insert_bounded(
            &mut self.registry(),
            key,
            Arc::new(element),
            MAX_REGISTERED_ELEMENTS,
        );
        ElementHandle::new(format!("{HANDLE_PREFIX}{key}"), locator.clone())
    }

    fn element(&self, handle: &ElementHandle) -> TabwalkResult<Arc<Element>> {
        handle_key(&handle.id)
            .and_then(|key| self.registry().get(&key).cloned())
            .ok_or_else(|| TabwalkError::StaleElement {
                locator: handle.locator.to_string(),
                message: "element belongs to a previous document".into(),
            })
    }

    async fn query(&self, locator: &Locator) -> Option<Element> {
        let found = match locator.query() {
            Query::Css(selector) => self.page.find_element(selector).await,
            Query::XPath(expr) => self.page.find_xpath(expr).await,
        };
        found.ok()
    }

    /// Run a boolean-returning function on the element; `false` means detached
    async fn call_on(&self, handle: &ElementHandle, function: &str) -> TabwalkResult<()> {
        let element = self.element(handle)?;
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|e| element_error(handle, e.to_string()))?;
        if let Some(details) = returns.exception_details {
            return Err(element_error(handle, details.text));
        }
        match returns.result.value {
            Some(serde_json::Value::Bool(false)) => Err(TabwalkError::StaleElement {
                locator: handle.locator.to_string(),
                message: "node is detached from the document".into(),
            }),
            _ => Ok(()),
        }
    }

    async fn satisfies(&self, element: &Element, condition: WaitCondition) -> TabwalkResult<bool> {
        let function = match condition {
            WaitCondition::Present => IS_PRESENT,
            WaitCondition::Visible => IS_VISIBLE,
            WaitCondition::Clickable => IS_CLICKABLE,
        };
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|e| TabwalkError::script(e.to_string()))?;
        Ok(matches!(returns.result.value, Some(serde_json::Value::Bool(true))))
    }
}

fn is_detached(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["could not find node", "no node with given id", "detached", "cannot find context", "could not find object"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Insert under `key`, first releasing the oldest entries so at most `cap` remain
fn insert_bounded<V>(registry: &mut BTreeMap<u64, V>, key: u64, value: V, cap: usize) {
    while registry.len() >= cap.max(1) {
        registry.pop_first();
    }
    registry.insert(key, value);
}

fn handle_key(id: &str) -> Option<u64> {
    id.strip_prefix(HANDLE_PREFIX)?.parse().ok()
}

fn element_error(handle: &ElementHandle, message: String) -> TabwalkError {
    if is_detached(&message) {
        TabwalkError::StaleElement {
            locator: handle.locator.to_string(),
            message,
        }
    } else {
        TabwalkError::Interaction {
            locator: handle.locator.to_string(),
            message,
        }
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> TabwalkResult<()> {
        self.registry().clear();
        self.page
            .goto(url)
            .await
            .map_err(|e| TabwalkError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn ready_state(&self) -> TabwalkResult<String> {
        let value = self.execute_script("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn find_element(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> TabwalkResult<ElementHandle> {
        let start = Instant::now();
        loop {
            if let Some(element) = self.query(locator).await {
                match self.satisfies(&element, condition).await {
                    Ok(true) => return Ok(self.register(locator, element)),
                    Ok(false) => {}
                    Err(err) if is_detached(&err.to_string()) => {
                        return Err(TabwalkError::StaleElement {
                            locator: locator.to_string(),
                            message: err.to_string(),
                        });
                    }
                    Err(err) => tracing::debug!(%locator, error = %err, "condition check failed"),
                }
            }
            if start.elapsed() >= timeout {
                return Err(TabwalkError::NotFound {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_rows(&self, locator: &Locator) -> TabwalkResult<usize> {
        let value = self.execute_script(&locator.to_count_query()).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn click(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.call_on(element, IS_PRESENT).await?;
        let target = self.element(element)?;
        target
            .click()
            .await
            .map_err(|e| element_error(element, e.to_string()))?;
        Ok(())
    }

    async fn script_click(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.call_on(element, SCRIPT_CLICK).await
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.call_on(element, SCROLL_INTO_VIEW).await
    }

    async fn highlight(&self, element: &ElementHandle) -> TabwalkResult<()> {
        self.call_on(element, HIGHLIGHT).await
    }

    async fn execute_script(&self, script: &str) -> TabwalkResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| TabwalkError::script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn go_back(&self) -> TabwalkResult<()> {
        self.registry().clear();
        self.execute_script("window.history.back()").await?;
        Ok(())
    }

    async fn refresh(&self) -> TabwalkResult<()> {
        self.registry().clear();
        self.page
            .reload()
            .await
            .map_err(|e| TabwalkError::Navigation {
                url: "(reload)".into(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn screenshot(&self) -> TabwalkResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        let screenshot = self
            .page
            .execute(params)
            .await
            .map_err(|e| TabwalkError::Screenshot {
                message: e.to_string(),
            })?;

        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(|e| TabwalkError::Screenshot {
                message: e.to_string(),
            })
    }

    async fn close(&self) -> TabwalkResult<()> {
        self.registry().clear();
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        self.handler.abort();
        closed.map_err(|e| TabwalkError::BrowserLaunch {
            message: format!("close failed: {e}"),
        })?;
        tracing::debug!("chromium session closed");
        Ok(())
    }
}
