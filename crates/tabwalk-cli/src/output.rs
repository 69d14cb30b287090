//! Output formatting and progress reporting

use console::{style, Style, StyledObject, Term};
use indicatif::{ProgressBar, ProgressStyle};
use tabwalk::{CheckOutcome, RunStatus, Verdict};

/// Progress reporter for a foreground run
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// List every outcome, not just failures and skips
    pub verbose: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// List every recorded outcome after the run
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether an outcome gets its own line in the run listing
    #[must_use]
    pub const fn shows(&self, outcome: &CheckOutcome) -> bool {
        self.verbose || matches!(outcome.verdict, Verdict::Failed | Verdict::Skipped)
    }

    /// Start a percentage bar
    pub fn start_progress(&mut self, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Move the bar to an absolute percentage
    pub fn set_percent(&self, percent: u8) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_position(u64::from(percent.min(100)));
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self, status: RunStatus) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(status.to_string());
        }
    }

    fn line(&self, symbol: StyledObject<&str>, plain: &str, message: &str) {
        let prefix = if self.use_color {
            symbol.bold().to_string()
        } else {
            plain.to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.line(style("✓").green(), "PASS", message);
        }
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        self.line(style("✗").red(), "FAIL", message);
    }

    /// Print a skipped check
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.line(style("⚠").yellow(), "SKIP", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.line(style("ℹ").blue(), "INFO", message);
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print one recorded outcome with a verdict prefix
    pub fn outcome(&self, outcome: &CheckOutcome) {
        let line = format_outcome(outcome);
        match outcome.verdict {
            Verdict::Success => self.success(&line),
            Verdict::Failed => self.failure(&line),
            Verdict::Skipped => self.warning(&line),
            Verdict::Info => self.info(&line),
        }
    }

    /// Print the closing status line
    pub fn status_line(&self, status: RunStatus, summary: &str) {
        if self.quiet && status == RunStatus::Completed {
            return;
        }

        let _ = self.term.write_line("");
        let line = if self.use_color {
            let styled = match status {
                RunStatus::Completed => Style::new().green().bold(),
                RunStatus::Stopped => Style::new().yellow().bold(),
                _ => Style::new().red().bold(),
            };
            format!("{} {summary}", styled.apply_to(status.to_string().to_uppercase()))
        } else {
            format!("{} {summary}", status.to_string().to_uppercase())
        };
        let _ = self.term.write_line(&line);
    }
}

/// Render one outcome as `label  message`
#[must_use]
pub fn format_outcome(outcome: &CheckOutcome) -> String {
    match outcome.elapsed_seconds {
        Some(seconds) => format!("{:<6} {} ({seconds:.2}s)", outcome.label, outcome.message),
        None => format!("{:<6} {}", outcome.label, outcome.message),
    }
}
