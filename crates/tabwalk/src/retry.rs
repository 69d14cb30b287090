//! Retry wrapper for element lookup, clicks and navigation.
//!
//! Only stale references are retried here. An element that is absent after
//! its full wait window is a meaningful answer and goes straight back to the
//! caller, which decides whether absence is a failure or a skip.

use crate::driver::{AutomationDriver, ElementHandle};
use crate::locator::{Locator, WaitCondition};
use crate::result::{TabwalkError, TabwalkResult};
use std::time::{Duration, Instant};

/// Poll interval while waiting for `document.readyState`
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Attempt budget for one kind of lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up (at least 1)
    pub max_attempts: u32,
    /// Wait window per attempt
    pub wait_timeout: Duration,
    /// Sleep between stale retries
    pub retry_interval: Duration,
    /// Reload the page once when the final attempt is also stale
    pub refresh_on_exhaustion: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub const fn new(max_attempts: u32, wait_timeout: Duration) -> Self {
        Self {
            max_attempts,
            wait_timeout,
            retry_interval: Duration::from_secs(1),
            refresh_on_exhaustion: true,
        }
    }

    /// Set the sleep between stale retries
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Disable the last-resort page refresh
    #[must_use]
    pub const fn without_refresh(mut self) -> Self {
        self.refresh_on_exhaustion = false;
        self
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

/// Locate an element, retrying stale references.
///
/// `NotFound` propagates on the first attempt that reports it. When every
/// attempt is stale the page is refreshed once (if the policy allows) and
/// the stale error is returned.
pub async fn locate_with_retry<D: AutomationDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
    condition: WaitCondition,
    policy: &RetryPolicy,
) -> TabwalkResult<ElementHandle> {
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match driver
            .find_element(locator, condition, policy.wait_timeout)
            .await
        {
            Ok(element) => return Ok(element),
            Err(err) if err.is_stale() && attempt < attempts => {
                tracing::debug!(%locator, attempt, "stale element, retrying lookup");
                tokio::time::sleep(policy.retry_interval).await;
                attempt += 1;
            }
            Err(err) if err.is_stale() => {
                tracing::warn!(%locator, attempts, "element still stale after all attempts");
                if policy.refresh_on_exhaustion {
                    if let Err(refresh_err) = driver.refresh().await {
                        tracing::debug!(error = %refresh_err, "recovery refresh failed");
                    }
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Click an element, preferring a script-driven click.
///
/// Scrolls the element into view first (best-effort). A failing script click
/// falls back to a native click. Stale references are retried up to
/// `max_attempts` with `interval` between them. Returns `false` once the
/// attempts are exhausted or the click fails for another reason.
pub async fn click_with_retry<D: AutomationDriver + ?Sized>(
    driver: &D,
    element: &ElementHandle,
    max_attempts: u32,
    interval: Duration,
) -> bool {
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        if let Err(err) = driver.scroll_into_view(element).await {
            tracing::debug!(locator = %element.locator, error = %err, "scroll into view failed");
        }
        let result = match driver.script_click(element).await {
            Err(err) if !err.is_stale() => {
                tracing::debug!(locator = %element.locator, error = %err, "script click failed, using native click");
                driver.click(element).await
            }
            other => other,
        };
        match result {
            Ok(()) => return true,
            Err(err) if err.is_stale() => {
                tracing::debug!(locator = %element.locator, attempt, "stale element on click");
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
            Err(err) => {
                tracing::warn!(locator = %element.locator, error = %err, "click failed");
                return false;
            }
        }
    }
    tracing::warn!(locator = %element.locator, attempts, "click abandoned after stale retries");
    false
}

/// Load `url` and wait for the document to finish loading.
///
/// Each attempt navigates and then polls `document.readyState` until it is
/// `complete` or `ready_timeout` elapses.
pub async fn navigate_with_retry<D: AutomationDriver + ?Sized>(
    driver: &D,
    url: &str,
    attempts: u32,
    ready_timeout: Duration,
    retry_delay: Duration,
) -> TabwalkResult<()> {
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        let outcome = match driver.navigate(url).await {
            Ok(()) => wait_until_ready(driver, ready_timeout).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => {
                tracing::info!(url, attempt, "page loaded");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(url, attempt, error = %err, "navigation attempt failed");
                last_error = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    Err(TabwalkError::Navigation {
        url: url.to_string(),
        message: format!(
            "gave up after {attempts} attempts: {}",
            last_error.map_or_else(String::new, |e| e.to_string())
        ),
    })
}

async fn wait_until_ready<D: AutomationDriver + ?Sized>(
    driver: &D,
    timeout: Duration,
) -> TabwalkResult<()> {
    let start = Instant::now();
    loop {
        if driver.ready_state().await? == "complete" {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(TabwalkError::Timeout {
                ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(READY_POLL_INTERVAL.min(timeout)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedDriver, ScriptedElement, ScriptedPage};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(10)).with_retry_interval(Duration::ZERO)
    }

    mod locate_tests {
        use super::*;

        #[tokio::test]
        async fn test_stale_then_found() {
            let locator = Locator::css("#tab");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().with_stale_lookups(2),
            ));
            let element = locate_with_retry(&driver, &locator, WaitCondition::Visible, &fast(3))
                .await
                .unwrap();
            assert_eq!(element.locator, locator);
            assert_eq!(driver.call_count("find:"), 3);
            assert!(!driver.was_called("refresh"));
        }

        #[tokio::test]
        async fn test_not_found_is_not_retried() {
            let driver = ScriptedDriver::new(ScriptedPage::new());
            let err = locate_with_retry(
                &driver,
                &Locator::css("#missing"),
                WaitCondition::Visible,
                &fast(3),
            )
            .await
            .unwrap_err();
            assert!(err.is_absence());
            assert_eq!(driver.call_count("find:"), 1);
            assert!(!driver.was_called("refresh"));
        }

        #[tokio::test]
        async fn test_exhausted_stale_refreshes_once() {
            let locator = Locator::css("#flaky");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().with_stale_lookups(10),
            ));
            let err = locate_with_retry(&driver, &locator, WaitCondition::Visible, &fast(3))
                .await
                .unwrap_err();
            assert!(err.is_stale());
            assert_eq!(driver.call_count("find:"), 3);
            assert_eq!(driver.call_count("refresh"), 1);
        }

        #[tokio::test]
        async fn test_refresh_can_be_disabled() {
            let locator = Locator::css("#flaky");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(
                locator.clone(),
                ScriptedElement::visible().with_stale_lookups(10),
            ));
            let policy = fast(2).without_refresh();
            assert!(locate_with_retry(&driver, &locator, WaitCondition::Present, &policy)
                .await
                .is_err());
            assert!(!driver.was_called("refresh"));
        }

        #[tokio::test]
        async fn test_zero_attempts_still_tries_once() {
            let locator = Locator::css("#tab");
            let driver = ScriptedDriver::new(
                ScriptedPage::new().element(locator.clone(), ScriptedElement::visible()),
            );
            assert!(locate_with_retry(&driver, &locator, WaitCondition::Present, &fast(0))
                .await
                .is_ok());
        }
    }

    mod click_tests {
        use super::*;

        fn page_with(element: ScriptedElement) -> (ScriptedDriver, ElementHandle) {
            let locator = Locator::css("#target");
            let driver = ScriptedDriver::new(ScriptedPage::new().element(locator.clone(), element));
            (driver, ElementHandle::new("target", locator))
        }

        #[tokio::test]
        async fn test_script_click_preferred() {
            let (driver, element) = page_with(ScriptedElement::visible());
            assert!(click_with_retry(&driver, &element, 3, Duration::ZERO).await);
            assert_eq!(driver.call_count("script_click:"), 1);
            assert_eq!(driver.call_count("click:"), 0);
            assert!(driver.was_called("scroll:"));
        }

        #[tokio::test]
        async fn test_native_fallback() {
            let (driver, element) = page_with(ScriptedElement::visible().with_script_click_failure());
            assert!(click_with_retry(&driver, &element, 3, Duration::ZERO).await);
            assert_eq!(driver.call_count("click:"), 1);
        }

        #[tokio::test]
        async fn test_stale_retried() {
            let (driver, element) = page_with(ScriptedElement::visible().with_stale_clicks(2));
            assert!(click_with_retry(&driver, &element, 3, Duration::ZERO).await);
            assert_eq!(driver.call_count("script_click:"), 3);
        }

        #[tokio::test]
        async fn test_exhausted_returns_false() {
            let (driver, element) = page_with(ScriptedElement::visible().with_stale_clicks(5));
            assert!(!click_with_retry(&driver, &element, 3, Duration::ZERO).await);
            assert_eq!(driver.call_count("script_click:"), 3);
        }
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test]
        async fn test_navigation_recovers() {
            let driver = ScriptedDriver::new(ScriptedPage::new().navigation_failures(2));
            navigate_with_retry(&driver, "http://app", 3, Duration::from_millis(10), Duration::ZERO)
                .await
                .unwrap();
            assert_eq!(driver.call_count("navigate:"), 3);
        }

        #[tokio::test]
        async fn test_navigation_exhausted() {
            let driver = ScriptedDriver::new(ScriptedPage::new().navigation_failures(5));
            let err = navigate_with_retry(
                &driver,
                "http://app",
                3,
                Duration::from_millis(10),
                Duration::ZERO,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, TabwalkError::Navigation { .. }));
            assert!(err.to_string().contains("gave up after 3 attempts"));
        }

        #[tokio::test]
        async fn test_document_never_ready() {
            let driver = ScriptedDriver::new(ScriptedPage::new().ready_state("loading"));
            let result = navigate_with_retry(
                &driver,
                "http://app",
                2,
                Duration::from_millis(5),
                Duration::ZERO,
            )
            .await;
            assert!(result.is_err());
            assert_eq!(driver.call_count("navigate:"), 2);
        }
    }
}
