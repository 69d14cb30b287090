//! Result and error types for Tabwalk.

use thiserror::Error;

/// Result type for Tabwalk operations
pub type TabwalkResult<T> = Result<T, TabwalkError>;

/// Errors that can occur in Tabwalk
#[derive(Debug, Error)]
pub enum TabwalkError {
    /// Element reference went stale (DOM re-rendered underneath it)
    #[error("Stale element reference for {locator}: {message}")]
    StaleElement {
        /// Locator the element was resolved from
        locator: String,
        /// Error message
        message: String,
    },

    /// Element not found within the wait window
    #[error("Element {locator} not found within {timeout_ms}ms")]
    NotFound {
        /// Locator that was searched
        locator: String,
        /// Wait window in milliseconds
        timeout_ms: u64,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// In-page script raised an error
    #[error("JavaScript execution failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Element interaction (click, scroll) failed
    #[error("Interaction with {locator} failed: {message}")]
    Interaction {
        /// Locator of the element
        locator: String,
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Screenshot capture failed
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Configuration is malformed or inconsistent
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Environment name has no configured base URL
    #[error("Unknown environment '{name}'")]
    UnknownEnvironment {
        /// Requested environment
        name: String,
    },

    /// A run is already active
    #[error("A validation run is already in progress (run {run_id})")]
    RunInProgress {
        /// Identifier of the active run
        run_id: String,
    },

    /// Requested control action does not apply to the current run state
    #[error("Invalid run state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl TabwalkError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a script error
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Transient failure that the retry layer absorbs
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// Element absent after its full wait window
    #[must_use]
    pub const fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_classification() {
        let err = TabwalkError::StaleElement {
            locator: "css=#tab".into(),
            message: "node detached".into(),
        };
        assert!(err.is_stale());
        assert!(!err.is_absence());
    }

    #[test]
    fn test_absence_classification() {
        let err = TabwalkError::NotFound {
            locator: "xpath=//table".into(),
            timeout_ms: 5000,
        };
        assert!(err.is_absence());
        assert!(!err.is_stale());
        assert!(TabwalkError::Timeout { ms: 10 }.is_absence());
    }

    #[test]
    fn test_display_messages() {
        let err = TabwalkError::NotFound {
            locator: "id=accounts".into(),
            timeout_ms: 3000,
        };
        assert_eq!(err.to_string(), "Element id=accounts not found within 3000ms");

        let err = TabwalkError::UnknownEnvironment {
            name: "qa".into(),
        };
        assert_eq!(err.to_string(), "Unknown environment 'qa'");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TabwalkError = io.into();
        assert!(matches!(err, TabwalkError::Io(_)));
    }
}
