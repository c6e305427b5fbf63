//! Shared utilities for CLI commands

use cf_core::{RunReport, SkipReason, TableState};
use std::fmt;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and the warehouse is closed cleanly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only, never shown to the user
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Pluralize a count for summaries
pub(crate) fn plural(count: usize, one: &str, many: &str) -> String {
    format!("{} {}", count, if count == 1 { one } else { many })
}

/// Human-readable run summary
pub(crate) fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    for outcome in &report.tables {
        let detail = match outcome.state {
            TableState::Done => format!("{} ms", outcome.duration_ms),
            TableState::Failed => outcome
                .errors
                .first()
                .map(|e| format!("{} in {}", e.message, e.stage))
                .unwrap_or_default(),
            TableState::Skipped => match outcome.skip_reason {
                Some(SkipReason::UpstreamTierFailed) => "upstream tier failed".to_string(),
                Some(SkipReason::Cancelled) => "cancelled".to_string(),
                None => String::new(),
            },
        };
        let marker = match outcome.state {
            TableState::Done => "✓",
            TableState::Failed => "✗",
            TableState::Skipped => "-",
        };
        out.push_str(&format!(
            "  {} [tier {}] {} ({})\n",
            marker,
            outcome.tier + 1,
            outcome.table,
            detail
        ));
    }

    for dangling in report.dangling_references() {
        out.push_str(&format!(
            "  ! {}.{}: {} in {} without a {} key\n",
            dangling.table,
            dangling.column,
            plural(dangling.rows, "row", "rows"),
            dangling.query_file,
            dangling.referenced_table
        ));
    }
    for error in &report.run_errors {
        out.push_str(&format!("  ! {}\n", error));
    }

    out.push('\n');
    out.push_str(&format!(
        "{} done, {} failed, {} skipped",
        report.count(TableState::Done),
        report.count(TableState::Failed),
        report.count(TableState::Skipped)
    ));
    if let Some(count) = report.stale_mappings_invalidated {
        out.push_str(&format!(
            ", {} invalidated",
            plural(count, "stale mapping", "stale mappings")
        ));
    }
    if report.cancelled {
        out.push_str(" (cancelled)");
    }
    out
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
