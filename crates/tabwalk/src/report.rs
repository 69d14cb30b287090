//! Run reports rendered from a [`RunState`] snapshot.

use crate::capture::sanitize;
use crate::result::TabwalkResult;
use crate::state::{CheckOutcome, RunState, RunStatus, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Timing statistics for one component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentStats {
    /// Component name, e.g. `Tab: Accounts`
    pub name: String,
    /// Samples
    pub count: usize,
    /// Fastest sample in seconds
    pub min: f64,
    /// Slowest sample in seconds
    pub max: f64,
    /// Mean in seconds
    pub avg: f64,
}

impl ComponentStats {
    fn from_samples(name: &str, samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self {
            name: name.to_string(),
            count: samples.len(),
            min,
            max,
            avg,
        })
    }
}

/// Report model for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Project name
    pub project_name: String,
    /// Run identifier
    pub run_id: String,
    /// Environment under test
    pub environment: String,
    /// Final (or current) status
    pub status: RunStatus,
    /// When the report was built
    pub generated_at: DateTime<Utc>,
    /// Wall-clock duration in seconds
    pub duration_seconds: f64,
    /// Successful checks
    pub successful: u32,
    /// Failed checks
    pub failed: u32,
    /// Skipped checks
    pub skipped: u32,
    /// Successful share in percent
    pub success_rate: f64,
    /// Timing statistics, by component name
    pub components: Vec<ComponentStats>,
    /// Every recorded outcome
    pub results: Vec<CheckOutcome>,
    /// Captured screenshots
    pub screenshots: Vec<String>,
}

impl RunReport {
    /// Build a report from a snapshot
    #[must_use]
    pub fn from_state(project_name: &str, state: &RunState) -> Self {
        Self {
            project_name: project_name.to_string(),
            run_id: state.run_id.clone().unwrap_or_default(),
            environment: state.environment.clone().unwrap_or_default(),
            status: state.status,
            generated_at: Utc::now(),
            duration_seconds: state.duration_seconds(),
            successful: state.successful,
            failed: state.failed,
            skipped: state.skipped,
            success_rate: state.success_rate(),
            components: state
                .metrics
                .iter()
                .filter_map(|(name, samples)| ComponentStats::from_samples(name, samples))
                .collect(),
            results: state.results.clone(),
            screenshots: state.screenshots.clone(),
        }
    }

    /// Counted checks
    #[must_use]
    pub const fn total_checks(&self) -> u32 {
        self.successful + self.failed + self.skipped
    }

    /// Failed outcomes
    #[must_use]
    pub fn failures(&self) -> Vec<&CheckOutcome> {
        self.results
            .iter()
            .filter(|r| r.verdict.is_failed())
            .collect()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} [{}]: {}, {}/{} successful ({:.1}%), {} failed, {} skipped in {:.2}s",
            self.project_name,
            self.environment,
            self.status,
            self.successful,
            self.total_checks(),
            self.success_rate,
            self.failed,
            self.skipped,
            self.duration_seconds
        )
    }

    /// Default file name: `<env>_<run_id>_<timestamp>.html`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.html",
            sanitize(&self.environment),
            sanitize(&self.run_id),
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the HTML report into `dir` and return its path
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the file written
    pub fn save_html(&self, dir: &Path) -> TabwalkResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.render_html())?;
        tracing::info!(path = %path.display(), "report saved");
        Ok(path)
    }

    /// Plain-text rendering for terminals and logs
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "{}", self.summary());
        let _ = writeln!(text, "Run {}", self.run_id);
        text.push('\n');
        for result in &self.results {
            let _ = writeln!(
                text,
                "  [{:<7}] {:<6} {}",
                result.verdict.to_string(),
                result.label,
                result.message
            );
        }
        if !self.components.is_empty() {
            text.push_str("\nTimings (s):\n");
            for stats in &self.components {
                let _ = writeln!(
                    text,
                    "  {:<40} n={:<3} min={:.2} avg={:.2} max={:.2}",
                    stats.name, stats.count, stats.min, stats.avg, stats.max
                );
            }
        }
        text
    }

    /// HTML rendering
    #[must_use]
    pub fn render_html(&self) -> String {
        let mut html = String::new();

        // Header
        let _ = write!(
            html,
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{} Validation Report</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; }}
        .summary {{ background: #f5f5f5; padding: 20px; border-radius: 8px; margin-bottom: 20px; }}
        .progress-bar {{ background: #ddd; height: 20px; border-radius: 10px; overflow: hidden; }}
        .passed {{ background: #4caf50; height: 100%; }}
        .check {{ padding: 10px; margin: 5px 0; border-radius: 4px; }}
        .check.success {{ background: #e8f5e9; border-left: 4px solid #4caf50; }}
        .check.failed {{ background: #ffebee; border-left: 4px solid #f44336; }}
        .check.skipped {{ background: #fff3e0; border-left: 4px solid #ff9800; }}
        .check.info {{ background: #e3f2fd; border-left: 4px solid #2196f3; }}
        table {{ border-collapse: collapse; }}
        td, th {{ padding: 4px 12px; text-align: left; border-bottom: 1px solid #ddd; }}
    </style>
</head>
<body>
"#,
            escape_html(&self.project_name)
        );

        // Summary
        let _ = write!(
            html,
            r#"<div class="summary">
    <h1>{} Validation Report</h1>
    <p>Environment: <strong>{}</strong> &middot; Run: <code>{}</code> &middot; Status: <strong>{}</strong></p>
    <h2>Results: {}/{} successful ({:.1}%)</h2>
    <div class="progress-bar">
        <div class="passed" style="width: {:.1}%"></div>
    </div>
    <p>Failed: {} &middot; Skipped: {} &middot; Duration: {:.2}s</p>
</div>
"#,
            escape_html(&self.project_name),
            escape_html(&self.environment),
            escape_html(&self.run_id),
            self.status,
            self.successful,
            self.total_checks(),
            self.success_rate,
            self.success_rate,
            self.failed,
            self.skipped,
            self.duration_seconds
        );

        // Results
        html.push_str("<h2>Checks</h2>\n");
        for result in &self.results {
            let class = match result.verdict {
                Verdict::Success => "success",
                Verdict::Failed => "failed",
                Verdict::Skipped => "skipped",
                Verdict::Info => "info",
            };
            let elapsed = result
                .elapsed_seconds
                .map_or_else(String::new, |s| format!(" ({s:.2}s)"));
            let _ = writeln!(
                html,
                r#"<div class="check {class}"><strong>{}</strong> {} - {}{elapsed}</div>"#,
                escape_html(&result.label),
                result.verdict,
                escape_html(&result.message)
            );
        }

        // Timings
        if !self.components.is_empty() {
            html.push_str(
                "<h2>Timings</h2>\n<table>\n<tr><th>Component</th><th>Count</th><th>Min (s)</th><th>Avg (s)</th><th>Max (s)</th></tr>\n",
            );
            for stats in &self.components {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>",
                    escape_html(&stats.name),
                    stats.count,
                    stats.min,
                    stats.avg,
                    stats.max
                );
            }
            html.push_str("</table>\n");
        }

        // Screenshots
        if !self.screenshots.is_empty() {
            html.push_str("<h2>Screenshots</h2>\n<ul>\n");
            for path in &self.screenshots {
                let _ = writeln!(html, "<li><code>{}</code></li>", escape_html(path));
            }
            html.push_str("</ul>\n");
        }

        // Footer
        let _ = write!(
            html,
            r#"
<footer>
    <p>Generated by Tabwalk at {}</p>
</footer>
</body>
</html>
"#,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        html
    }
}

/// Escape HTML special characters for text and attribute values
#[must_use]
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CheckKind, SharedRunState};

    fn finished_state() -> RunState {
        let state = SharedRunState::new();
        state.begin_run("staging", false).unwrap();
        state.record_outcome(
            CheckOutcome::new("1", CheckKind::MainTab, Verdict::Success, "Tab 'Home' opened")
                .with_elapsed(0.5),
        );
        state.record_outcome(CheckOutcome::new(
            "2",
            CheckKind::MainTab,
            Verdict::Failed,
            "Tab '<Sales>' could not be located",
        ));
        state.record_outcome(CheckOutcome::new(
            "2.a",
            CheckKind::RecordWorkflow,
            Verdict::Skipped,
            "no rows",
        ));
        state.record_timing("Tab: Home", 0.5);
        state.record_timing("Tab: Home", 1.5);
        state.record_screenshot("screenshots/run/staging_login.png");
        state.finish_run(RunStatus::Failed);
        state.snapshot()
    }

    mod model_tests {
        use super::*;

        #[test]
        fn test_from_state_totals() {
            let report = RunReport::from_state("Acme", &finished_state());
            assert_eq!(report.environment, "staging");
            assert_eq!(report.run_id.len(), 8);
            assert_eq!(report.total_checks(), 3);
            assert_eq!(report.failures().len(), 1);
            assert!((report.success_rate - 100.0 / 3.0).abs() < 1e-9);
        }

        #[test]
        fn test_component_stats() {
            let report = RunReport::from_state("Acme", &finished_state());
            assert_eq!(
                report.components,
                vec![ComponentStats {
                    name: "Tab: Home".into(),
                    count: 2,
                    min: 0.5,
                    max: 1.5,
                    avg: 1.0,
                }]
            );
        }

        #[test]
        fn test_summary_line() {
            let report = RunReport::from_state("Acme", &finished_state());
            assert!(report
                .summary()
                .starts_with("Acme [staging]: Failed, 1/3 successful (33.3%), 1 failed, 1 skipped"));
        }

        #[test]
        fn test_file_name() {
            let report = RunReport::from_state("Acme", &finished_state());
            let name = report.file_name();
            assert!(name.starts_with(&format!("staging_{}_", report.run_id)));
            assert!(name.ends_with(".html"));
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_render_html_escapes() {
            let html = RunReport::from_state("Acme", &finished_state()).render_html();
            assert!(html.contains("Acme Validation Report"));
            assert!(html.contains("Tab &#39;&lt;Sales&gt;&#39; could not be located"));
            assert!(!html.contains("<Sales>"));
            assert!(html.contains("class=\"check failed\""));
            assert!(html.contains("staging_login.png"));
            assert!(html.contains("<td>Tab: Home</td>"));
        }

        #[test]
        fn test_render_text() {
            let text = RunReport::from_state("Acme", &finished_state()).render_text();
            assert!(text.contains("[Failed ] 2"));
            assert!(text.contains("Tab: Home"));
        }

        #[test]
        fn test_save_html() {
            let dir = tempfile::tempdir().unwrap();
            let report = RunReport::from_state("Acme", &finished_state());
            let path = report.save_html(&dir.path().join("reports")).unwrap();
            assert!(path.exists());
            let body = std::fs::read_to_string(path).unwrap();
            assert!(body.contains("Generated by Tabwalk"));
        }

        #[test]
        fn test_escape_html() {
            assert_eq!(escape_html("a & b"), "a &amp; b");
            assert_eq!(escape_html("\"x\""), "&quot;x&quot;");
        }
    }
}
