//! Check command handler

use std::fmt::Write as _;
use std::path::Path;
use tabwalk::{sub_tab_letter, tab_label, ColumnResolution, ExecutionMode, ValidationConfig};

use crate::error::{CliError, CliResult};
use crate::CheckArgs;

/// Load and validate the configuration, then render it
pub fn execute_check(path: &Path, args: &CheckArgs) -> CliResult<String> {
    let config = load_config(path)?;
    if args.json {
        return serde_json::to_string_pretty(&config)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|e| CliError::config(e.to_string()));
    }
    Ok(render_tree(&config))
}

/// Load a configuration file, naming the file in any error
pub fn load_config(path: &Path) -> CliResult<ValidationConfig> {
    ValidationConfig::from_path(path)
        .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
}

/// Environments followed by the labelled tab tree
#[must_use]
pub fn render_tree(config: &ValidationConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", config.project_name);

    let _ = writeln!(out, "Environments ({}):", config.environments.len());
    let width = config.environments.keys().map(String::len).max().unwrap_or(0);
    for (name, url) in &config.environments {
        let _ = writeln!(out, "  {name:<width$}  {url}");
    }

    let mode = match config.execution.mode {
        ExecutionMode::Sequential => "sequential",
        ExecutionMode::Parallel => "parallel",
    };
    let _ = writeln!(out, "Tabs ({}, {mode} mode):", config.tabs.len());
    for (i, tab) in config.tabs.iter().enumerate() {
        let label = tab_label(i);
        let _ = write!(out, "  {label:<6} {}", tab.name);
        if let Some(column) = tab.own_record_column() {
            let _ = write!(out, "  [record column {column}]");
        }
        out.push('\n');

        for (j, sub) in tab.sub_tabs().iter().enumerate() {
            let sub_label = format!("{label}.{}", sub_tab_letter(j));
            let _ = write!(out, "  {sub_label:<6}   {}", sub.name);
            match tab.record_column_for(&sub.name) {
                ColumnResolution::Column(column) => {
                    let _ = write!(out, "  [record column {column}]");
                }
                ColumnResolution::Unspecified => out.push_str("  [record column unspecified]"),
                ColumnResolution::NotConfigured => {}
            }
            out.push('\n');
        }
    }
    out
}
