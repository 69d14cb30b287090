//! Best-effort screenshot capture into a per-run directory.

use crate::driver::AutomationDriver;
use crate::state::SharedRunState;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Writes `<root>/<run_id>/<name>_<timestamp>.png`
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
    state: SharedRunState,
}

impl ScreenshotStore {
    /// Store for one run
    #[must_use]
    pub fn new(root: impl AsRef<Path>, run_id: &str, state: SharedRunState) -> Self {
        Self {
            dir: root.as_ref().join(run_id),
            state,
        }
    }

    /// Directory this run writes into
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture the current viewport. Failures are logged and swallowed.
    pub async fn capture<D: AutomationDriver + ?Sized>(
        &self,
        driver: &D,
        name: &str,
    ) -> Option<PathBuf> {
        let bytes = match driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(name, error = %err, "screenshot failed");
                return None;
            }
        };
        let file = self.dir.join(format!(
            "{}_{}.png",
            sanitize(name),
            Utc::now().format("%Y%m%d_%H%M%S%3f")
        ));
        let written = match tokio::fs::create_dir_all(&self.dir).await {
            Ok(()) => tokio::fs::write(&file, bytes).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            tracing::warn!(path = %file.display(), error = %err, "could not save screenshot");
            return None;
        }
        tracing::debug!(path = %file.display(), "screenshot saved");
        self.state.record_screenshot(file.display().to_string());
        Some(file)
    }
}

/// Reduce a label to a portable file-name stem.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "screenshot".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedDriver, ScriptedPage};

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("tab_Sales & Ops"), "tab_Sales___Ops");
        assert_eq!(sanitize(""), "screenshot");
        assert_eq!(sanitize("staging-login"), "staging-login");
    }

    #[tokio::test]
    async fn test_capture_writes_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let state = SharedRunState::new();
        let store = ScreenshotStore::new(dir.path(), "ab12cd34", state.clone());
        let driver = ScriptedDriver::new(ScriptedPage::new());
        let path = store.capture(&driver, "staging_login").await.unwrap();
        assert!(path.starts_with(dir.path().join("ab12cd34")));
        assert!(path.exists());
        assert_eq!(state.snapshot().screenshots.len(), 1);
    }

    #[tokio::test]
    async fn test_capture_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let state = SharedRunState::new();
        let store = ScreenshotStore::new(dir.path(), "run", state.clone());
        let driver = ScriptedDriver::new(ScriptedPage::new().failing_screenshots());
        assert!(store.capture(&driver, "final").await.is_none());
        assert!(state.snapshot().screenshots.is_empty());
    }
}
