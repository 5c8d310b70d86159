//! Presentation of a [`ReportSummary`]. No decisions are made here.

use super::{ReportSummary, RiskLevel};
use colored::Colorize;
use std::fmt::Write;

fn risk_colored(level: RiskLevel) -> colored::ColoredString {
    let text = level.to_string().to_uppercase();
    match level {
        RiskLevel::None => text.dimmed(),
        RiskLevel::Low => text.green(),
        RiskLevel::Medium => text.yellow(),
        RiskLevel::High => text.red().bold(),
    }
}

/// Coloured console text.
pub fn plain(summary: &ReportSummary) -> String {
    let mut out = String::new();
    let title = if summary.dry_run {
        "Field mapper conversion report (dry run)"
    } else {
        "Field mapper conversion report"
    };
    let _ = writeln!(out, "{}", title.bold());
    if let Some(session) = &summary.session_id {
        let _ = writeln!(out, "{}", format!("Session: {session}").dimmed());
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Files:       {} ({} succeeded, {} failed)",
        summary.files,
        summary.succeeded.to_string().green(),
        if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().normal()
        }
    );
    let _ = writeln!(
        out,
        "Sites:       {} ({} auto-convertible, {} ambiguous)",
        summary.total_sites, summary.auto_convertible, summary.ambiguous
    );
    let _ = writeln!(
        out,
        "Decisions:   {} approved, {} review, {} rejected ({} excluded)",
        summary.approved.to_string().green(),
        summary.needs_review.to_string().yellow(),
        summary.rejected.to_string().red(),
        summary.excluded
    );
    let _ = writeln!(out, "Applied:     {}", summary.applied);
    if summary.manual_followups > 0 {
        let _ = writeln!(out, "Follow-ups:  {}", summary.manual_followups);
    }
    let _ = writeln!(out, "Confidence:  {:.0}%", summary.mean_confidence * 100.0);
    if let Some(score) = summary.min_safety_score {
        let _ = writeln!(out, "Safety:      {score}/100 (lowest)");
    }
    let _ = writeln!(out, "Time saved:  {}", summary.time_saved);
    let _ = writeln!(out, "Risk:        {}", risk_colored(summary.risk_level));

    if summary.file_summaries.len() > 1 {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Files".bold());
        for file in &summary.file_summaries {
            let mark = if file.success { "✓".green() } else { "✗".red() };
            let _ = writeln!(
                out,
                "  {mark} {} ({} sites, {} applied)",
                file.path.display(),
                file.sites,
                file.applied
            );
        }
    }

    let skipped: Vec<_> = summary
        .file_summaries
        .iter()
        .filter_map(|f| f.skipped_reason.as_ref().map(|r| (&f.path, r)))
        .collect();
    if !skipped.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Skipped".yellow().bold());
        for (path, reason) in skipped {
            let _ = writeln!(out, "  {}: {reason}", path.display());
        }
    }

    let warnings: Vec<_> = summary
        .file_summaries
        .iter()
        .flat_map(|f| f.warnings.iter().map(move |w| (&f.path, w)))
        .collect();
    if !warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Warnings".yellow().bold());
        for (path, warning) in warnings {
            let _ = writeln!(out, "  {}: {warning}", path.display());
        }
    }

    if !summary.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Failures".red().bold());
        for failure in &summary.failures {
            let rolled = if failure.rolled_back {
                " (rolled back)".dimmed()
            } else {
                "".normal()
            };
            let _ = writeln!(out, "  {}: {}{rolled}", failure.path.display(), failure.error);
        }
    }

    if !summary.recommendations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Recommendations".bold());
        for rec in &summary.recommendations {
            let _ = writeln!(out, "  - {rec}");
        }
    }

    out
}

/// Pretty-printed JSON of the whole summary.
pub fn structured(summary: &ReportSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

/// Markdown document.
pub fn markup(summary: &ReportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Field Mapper Conversion Report");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {}{}",
        summary.generated_at.to_rfc3339(),
        if summary.dry_run { " (dry run)" } else { "" }
    );
    if let Some(session) = &summary.session_id {
        let _ = writeln!(out, "\nSession `{session}`");
    }

    let _ = writeln!(out, "\n## Summary\n");
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|---|---|");
    let rows = [
        ("Files", format!("{} ({} failed)", summary.files, summary.failed)),
        ("Total sites", summary.total_sites.to_string()),
        ("Auto-convertible", summary.auto_convertible.to_string()),
        ("Ambiguous", summary.ambiguous.to_string()),
        ("Approved", summary.approved.to_string()),
        ("Needs review", summary.needs_review.to_string()),
        ("Rejected", summary.rejected.to_string()),
        ("Excluded", summary.excluded.to_string()),
        ("Applied", summary.applied.to_string()),
        (
            "Mean confidence",
            format!("{:.0}%", summary.mean_confidence * 100.0),
        ),
        ("Time saved", summary.time_saved.clone()),
        ("Risk level", summary.risk_level.to_string()),
    ];
    for (metric, value) in rows {
        let _ = writeln!(out, "| {metric} | {value} |");
    }

    if !summary.file_summaries.is_empty() {
        let _ = writeln!(out, "\n## Files\n");
        let _ = writeln!(
            out,
            "| File | Status | Sites | Approved | Review | Rejected | Applied | Safety |"
        );
        let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
        for file in &summary.file_summaries {
            let _ = writeln!(
                out,
                "| `{}` | {} | {} | {} | {} | {} | {} | {} |",
                file.path.display(),
                if file.success { "ok" } else { "failed" },
                file.sites,
                file.approved,
                file.needs_review,
                file.rejected,
                file.applied,
                file.safety_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    if !summary.failures.is_empty() {
        let _ = writeln!(out, "\n## Failures\n");
        for failure in &summary.failures {
            let _ = writeln!(
                out,
                "- `{}`: {}{}",
                failure.path.display(),
                failure.error,
                if failure.rolled_back { " (rolled back)" } else { "" }
            );
        }
    }

    if !summary.recommendations.is_empty() {
        let _ = writeln!(out, "\n## Recommendations\n");
        for rec in &summary.recommendations {
            let _ = writeln!(out, "- {rec}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::FileOutcome;
    use std::path::PathBuf;

    fn failed_summary() -> ReportSummary {
        let outcome = FileOutcome {
            success: false,
            file_path: PathBuf::from("src/a.js"),
            error: Some("boom".to_string()),
            report: None,
            rolled_back: true,
        };
        ReportSummary::from_file(&outcome, Some("session-1"))
    }

    #[test]
    fn test_markup_lists_failures() {
        let md = markup(&failed_summary());
        assert!(md.starts_with("# Field Mapper Conversion Report"));
        assert!(md.contains("| Risk level | none |"));
        assert!(md.contains("- `src/a.js`: boom (rolled back)"));
    }

    #[test]
    fn test_structured_is_json() {
        let json = structured(&failed_summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["failed"], 1);
        assert_eq!(value["risk_level"], "none");
        assert_eq!(value["session_id"], "session-1");
    }

    #[test]
    fn test_plain_mentions_failure() {
        let text = plain(&failed_summary());
        assert!(text.contains("src/a.js: boom"));
        assert!(text.contains("Session: session-1"));
    }
}
