//! Markdown council report (`COUNCIL_REPORT.md`)

use std::fmt::Write;

use chrono::{DateTime, Local};

use super::aggregate::AggregatedOutcome;

/// Default report file name
pub const REPORT_FILE: &str = "COUNCIL_REPORT.md";

/// Render the report for `target`, stamped with the current local time
pub fn render_markdown(outcome: &AggregatedOutcome, target: &str) -> String {
    render_markdown_at(outcome, target, Local::now())
}

pub fn render_markdown_at(outcome: &AggregatedOutcome, target: &str, at: DateTime<Local>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Council Report\n");
    let _ = writeln!(out, "- **Target:** `{}`", target);
    let _ = writeln!(out, "- **Generated:** {}", at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "- **Overall status:** {}",
        outcome.overall_status.as_str().to_uppercase()
    );
    if let (Some(iterations), Some(max)) = (outcome.iterations, outcome.max_iterations) {
        let _ = write!(out, "- **Iterations:** {} of {}", iterations, max);
        if let Some(termination) = outcome.termination {
            let _ = write!(out, " ({})", termination);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "\n## Summary\n");
    let _ = writeln!(out, "| Status | Collaborators |");
    let _ = writeln!(out, "|--------|---------------|");
    let _ = writeln!(out, "| pass | {} |", outcome.passed);
    let _ = writeln!(out, "| warn | {} |", outcome.warned);
    let _ = writeln!(out, "| fail | {} |", outcome.failed);
    let _ = writeln!(out, "\nTotal issues: {}", outcome.total_issues);

    for verdict in &outcome.verdicts {
        let _ = writeln!(out, "\n## {}: {}\n", verdict.collaborator(), verdict.status());
        if !verdict.summary().is_empty() {
            let _ = writeln!(out, "{}\n", verdict.summary());
        }
        if verdict.issues().is_empty() {
            let _ = writeln!(out, "No issues.");
        } else {
            for issue in verdict.issues() {
                let _ = writeln!(out, "- {}", issue);
            }
        }
    }

    out
}
