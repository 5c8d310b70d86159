//! ReportBuilder: one format-independent summary of a run, rendered on demand.
//!
//! The summary is derived purely from pipeline output. Rendering never
//! changes the numbers, only how they are presented.

pub mod render;

use crate::converter::{BatchOutcome, FileOutcome};
use crate::edit::{atomic_write, EditError};
use crate::scanner::{MANUAL_MINUTES_PER_SITE, TOOL_MINUTES_PER_AUTO_SITE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Rejected/total ratio above which risk is high and manual conversion is advised.
pub const HIGH_RISK_RATIO: f64 = 0.3;
/// Rejected/total ratio above which risk is medium.
pub const MEDIUM_RISK_RATIO: f64 = 0.1;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("unknown report format {0:?} (expected plain, structured or markup)")]
    UnknownFormat(String),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cannot create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Plain,
    Structured,
    Markup,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "console" | "text" => Ok(ReportFormat::Plain),
            "structured" | "json" => Ok(ReportFormat::Structured),
            "markup" | "markdown" | "md" => Ok(ReportFormat::Markup),
            _ => Err(ReportError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Plain => "plain",
            ReportFormat::Structured => "structured",
            ReportFormat::Markup => "markup",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_counts(rejected: usize, total: usize) -> Self {
        if total == 0 {
            return RiskLevel::None;
        }
        let ratio = rejected as f64 / total as f64;
        if ratio > HIGH_RISK_RATIO {
            RiskLevel::High
        } else if ratio > MEDIUM_RISK_RATIO {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// Per-file line of the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub success: bool,
    pub sites: usize,
    pub approved: usize,
    pub needs_review: usize,
    pub rejected: usize,
    pub applied: usize,
    pub safety_score: Option<u32>,
    pub skipped_reason: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub path: PathBuf,
    pub error: String,
    pub rolled_back: bool,
}

/// Everything a report states, independent of format.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub dry_run: bool,
    pub files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_sites: usize,
    pub auto_convertible: usize,
    pub ambiguous: usize,
    pub approved: usize,
    pub needs_review: usize,
    pub rejected: usize,
    /// Rejected because of an unsafe context (string, comment, regex)
    pub excluded: usize,
    pub applied: usize,
    pub manual_followups: usize,
    pub min_safety_score: Option<u32>,
    pub mean_confidence: f64,
    pub time_saved_minutes: f64,
    pub time_saved: String,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub failures: Vec<FailureEntry>,
    pub file_summaries: Vec<FileSummary>,
}

impl ReportSummary {
    pub fn from_file(outcome: &FileOutcome, session_id: Option<&str>) -> Self {
        Self::from_outcomes(std::slice::from_ref(outcome), session_id)
    }

    pub fn from_batch(batch: &BatchOutcome, session_id: Option<&str>) -> Self {
        Self::from_outcomes(&batch.results, session_id)
    }

    pub fn from_outcomes(outcomes: &[FileOutcome], session_id: Option<&str>) -> Self {
        let mut summary = ReportSummary {
            generated_at: Utc::now(),
            session_id: session_id.map(str::to_string),
            dry_run: false,
            files: outcomes.len(),
            succeeded: 0,
            failed: 0,
            total_sites: 0,
            auto_convertible: 0,
            ambiguous: 0,
            approved: 0,
            needs_review: 0,
            rejected: 0,
            excluded: 0,
            applied: 0,
            manual_followups: 0,
            min_safety_score: None,
            mean_confidence: 1.0,
            time_saved_minutes: 0.0,
            time_saved: String::new(),
            risk_level: RiskLevel::None,
            recommendations: Vec::new(),
            failures: Vec::new(),
            file_summaries: Vec::new(),
        };

        let mut confidence_sum = 0.0;
        let mut decided = 0usize;
        let mut file_recommendations = Vec::new();

        for outcome in outcomes {
            if outcome.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
                summary.failures.push(FailureEntry {
                    path: outcome.file_path.clone(),
                    error: outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                    rolled_back: outcome.rolled_back,
                });
            }

            let Some(report) = &outcome.report else {
                summary.file_summaries.push(FileSummary {
                    path: outcome.file_path.clone(),
                    success: outcome.success,
                    sites: 0,
                    approved: 0,
                    needs_review: 0,
                    rejected: 0,
                    applied: 0,
                    safety_score: None,
                    skipped_reason: None,
                    warnings: Vec::new(),
                });
                continue;
            };

            summary.dry_run |= report.dry_run;
            summary.total_sites += report.scan.total;
            summary.auto_convertible += report.scan.auto_convertible;
            summary.ambiguous += report.scan.requires_review;
            summary.approved += report.review.approved.len();
            summary.needs_review += report.review.needs_review.len();
            summary.rejected += report.review.rejected.len();
            summary.excluded += report.review.excluded();
            summary.applied += report.applied.len();
            summary.manual_followups += report.manual_followups;

            confidence_sum += report
                .review
                .all()
                .map(|r| r.decision.confidence)
                .sum::<f64>();
            decided += report.review.total();

            let safety_score = report.file_context.as_ref().map(|c| c.safety_score);
            if let Some(score) = safety_score {
                summary.min_safety_score =
                    Some(summary.min_safety_score.map_or(score, |min| min.min(score)));
            }
            if let Some(context) = &report.file_context {
                for rec in &context.recommendations {
                    file_recommendations.push(format!(
                        "{}: {} ({})",
                        outcome.file_path.display(),
                        rec.message,
                        rec.solution
                    ));
                }
            }

            summary.file_summaries.push(FileSummary {
                path: outcome.file_path.clone(),
                success: outcome.success,
                sites: report.scan.total,
                approved: report.review.approved.len(),
                needs_review: report.review.needs_review.len(),
                rejected: report.review.rejected.len(),
                applied: report.applied.len(),
                safety_score,
                skipped_reason: report.skipped_reason.clone(),
                warnings: report
                    .verification
                    .as_ref()
                    .map(|v| v.warnings.clone())
                    .unwrap_or_default(),
            });
        }

        if decided > 0 {
            summary.mean_confidence = confidence_sum / decided as f64;
        }
        summary.time_saved_minutes = time_saved_minutes(summary.approved);
        summary.time_saved = format_minutes(summary.time_saved_minutes);
        summary.risk_level = RiskLevel::from_counts(summary.rejected, summary.total_sites);
        summary.recommendations = recommendations(&summary);
        summary.recommendations.extend(file_recommendations);
        summary
    }
}

/// Minutes saved by converting `approved` sites with the tool.
pub fn time_saved_minutes(approved: usize) -> f64 {
    approved as f64 * (MANUAL_MINUTES_PER_SITE - TOOL_MINUTES_PER_AUTO_SITE)
}

/// Seconds below a minute, minutes below an hour, hours above.
pub fn format_minutes(minutes: f64) -> String {
    if minutes < 1.0 {
        format!("{:.0} seconds", minutes * 60.0)
    } else if minutes < 60.0 {
        format!("{minutes:.1} minutes")
    } else {
        format!("{:.1} hours", minutes / 60.0)
    }
}

fn recommendations(summary: &ReportSummary) -> Vec<String> {
    let mut recs = Vec::new();
    if summary.total_sites == 0 {
        return recs;
    }
    let rejected_ratio = summary.rejected as f64 / summary.total_sites as f64;
    if rejected_ratio > HIGH_RISK_RATIO {
        recs.push(format!(
            "{:.0}% of sites were rejected; prefer manual conversion for these files",
            rejected_ratio * 100.0
        ));
    }
    if summary.needs_review > summary.approved {
        recs.push(format!(
            "{} site(s) need review, more than were approved; allocate time for manual review",
            summary.needs_review
        ));
    }
    if summary.approved > 0 {
        recs.push(format!(
            "apply the {} approved conversion(s) first, then handle the rest by hand",
            summary.approved
        ));
    }
    if summary.manual_followups > 0 {
        recs.push(format!(
            "{} approved structural site(s) have no automatic rewrite; convert them manually",
            summary.manual_followups
        ));
    }
    recs
}

/// Render `summary` as `format` and, if `output_path` is given, write it there.
pub fn generate_report(
    summary: &ReportSummary,
    format: ReportFormat,
    output_path: Option<&Path>,
) -> Result<String, ReportError> {
    let rendered = match format {
        ReportFormat::Plain => render::plain(summary),
        ReportFormat::Structured => render::structured(summary)?,
        ReportFormat::Markup => render::markup(summary),
    };

    if let Some(path) = output_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        atomic_write(path, rendered.as_bytes()).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), %format, "report written");
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Structured);
        assert_eq!("Markdown".parse::<ReportFormat>().unwrap(), ReportFormat::Markup);
        assert_eq!("console".parse::<ReportFormat>().unwrap(), ReportFormat::Plain);
        assert!(matches!(
            "html".parse::<ReportFormat>(),
            Err(ReportError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_counts(0, 0), RiskLevel::None);
        assert_eq!(RiskLevel::from_counts(0, 10), RiskLevel::Low);
        assert_eq!(RiskLevel::from_counts(1, 10), RiskLevel::Low);
        assert_eq!(RiskLevel::from_counts(2, 10), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_counts(4, 10), RiskLevel::High);
    }

    #[test]
    fn test_time_saved_formatting() {
        assert_eq!(format_minutes(time_saved_minutes(1)), "29 seconds");
        assert_eq!(format_minutes(time_saved_minutes(10)), "4.9 minutes");
        assert_eq!(format_minutes(time_saved_minutes(200)), "1.6 hours");
    }

    #[test]
    fn test_empty_summary() {
        let summary = ReportSummary::from_outcomes(&[], None);
        assert_eq!(summary.files, 0);
        assert_eq!(summary.risk_level, RiskLevel::None);
        assert_eq!(summary.mean_confidence, 1.0);
        assert!(summary.recommendations.is_empty());
    }

    #[test]
    fn test_failure_is_listed_with_diagnostics() {
        let outcome = FileOutcome {
            success: false,
            file_path: PathBuf::from("broken.js"),
            error: Some("Cannot read broken.js".to_string()),
            report: None,
            rolled_back: false,
        };
        let summary = ReportSummary::from_file(&outcome, Some("session-x"));
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].error, "Cannot read broken.js");
        assert_eq!(summary.session_id.as_deref(), Some("session-x"));
    }

    #[test]
    fn test_generate_report_writes_nested_output() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("reports/nested/run.md");
        let summary = ReportSummary::from_outcomes(&[], None);

        let rendered = generate_report(&summary, ReportFormat::Markup, Some(&out)).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), rendered);
    }
}
