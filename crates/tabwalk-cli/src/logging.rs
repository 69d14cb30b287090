//! Tracing setup: console plus a plain-text log file the control panel can tail

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Log file name inside the configured log directory
pub const LOG_FILE_NAME: &str = "tabwalk.log";

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Path of the log file for a log directory
#[must_use]
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived default filter. Returns the log
/// file path.
pub fn init_logging(log_dir: &Path, config: &CliConfig) -> CliResult<PathBuf> {
    fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(log_dir)
        .map_err(|e| CliError::config(format!("Cannot open log file: {e}")))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(config.color.should_color())
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()
        .map_err(|e| CliError::config(format!("Logging already initialized: {e}")))?;

    Ok(log_file_path(log_dir))
}

/// Last `lines` lines of a log file, oldest first
pub fn tail_lines(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|line| (*line).to_string()).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        assert_eq!(
            log_file_path(Path::new("logs")),
            PathBuf::from("logs/tabwalk.log")
        );
    }

    #[test]
    fn test_tail_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(&path, "one\ntwo\nthree\n").unwrap();
        assert_eq!(tail_lines(&path, 2).unwrap(), vec!["two", "three"]);
    }

    #[test]
    fn test_tail_shorter_than_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(&path, "only\n").unwrap();
        assert_eq!(tail_lines(&path, 100).unwrap(), vec!["only"]);
    }

    #[test]
    fn test_tail_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tail_lines(&dir.path().join("absent.log"), 10).is_err());
    }
}
