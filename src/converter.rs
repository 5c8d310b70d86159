//! Orchestrator: runs the whole pipeline for one file or a batch.
//!
//! Per file: scan, classify, preflight, backup, decide, apply, write, verify.
//! Any error after the backup restores the file from the backup taken by
//! that run before the error is reported.

use crate::config::ConverterConfig;
use crate::context::{ContextClassifier, ContextError, FileContext, Language, SiteContext, SourceIndex};
use crate::decision::{DecisionEngine, DecisionError, ReviewedSite, Review};
use crate::edit::{self, EditError};
use crate::report::{generate_report, ReportError, ReportFormat, ReportSummary};
use crate::safety::{BackupRecord, RollbackReport, SafetyError, SafetyManager, Session};
use crate::scanner::{self, AppliedChange, PatternScanner, ScanError, ScanStats, ViolationSite};
use crate::validate::{self, ValidationError, Verification};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Cannot read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: PathBuf },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("Failed to apply conversions: {0}")]
    Edit(#[from] EditError),

    #[error("Verification failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Approval prompt failed for {path}: {source}")]
    Prompt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Compute everything, write nothing (no backups either)
    pub dry_run: bool,
    pub auto_approve: bool,
    pub interactive: bool,
    pub report_format: ReportFormat,
    pub report_output_path: Option<PathBuf>,
    /// Overrides the configured retention
    pub max_backups: Option<usize>,
    pub verbose: bool,
    pub stop_on_error: bool,
    /// Overrides the configured size-delta warning threshold
    pub size_delta_threshold: Option<f64>,
    /// Keep the original and converted text in each file report
    pub capture_diff: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_approve: false,
            interactive: true,
            report_format: ReportFormat::Plain,
            report_output_path: None,
            max_backups: None,
            verbose: false,
            stop_on_error: false,
            size_delta_threshold: None,
            capture_diff: false,
        }
    }
}

/// What an [`ApprovalPrompt`] is asked to confirm.
#[derive(Debug)]
pub struct ApprovalRequest<'a> {
    pub path: &'a Path,
    pub sites: &'a [&'a ReviewedSite],
    pub original: &'a str,
    pub converted: &'a str,
}

/// Confirms approved conversions before they are written.
///
/// An error fails the file; its backup is restored.
pub trait ApprovalPrompt {
    fn confirm(&mut self, request: &ApprovalRequest<'_>) -> io::Result<bool>;
}

/// Prompt that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ApprovalPrompt for AcceptAll {
    fn confirm(&mut self, _request: &ApprovalRequest<'_>) -> io::Result<bool> {
        Ok(true)
    }
}

/// Milliseconds spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub scan_ms: f64,
    pub context_ms: f64,
    pub review_ms: f64,
    pub apply_ms: f64,
    pub verify_ms: f64,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffPreview {
    pub before: String,
    pub after: String,
}

/// Everything the pipeline learned and did for one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub language: Language,
    pub dry_run: bool,
    pub scan: ScanStats,
    /// `None` when the scan found nothing
    pub file_context: Option<FileContext>,
    pub review: Review,
    /// Rewrites performed, or that would be performed in a dry run
    pub applied: Vec<AppliedChange>,
    /// Approved sites with no automatic rewrite
    pub manual_followups: usize,
    pub skipped_reason: Option<String>,
    pub backup: Option<BackupRecord>,
    pub verification: Option<Verification>,
    pub timings: StageTimings,
    pub diff: Option<DiffPreview>,
}

impl FileReport {
    fn empty(path: &Path, dry_run: bool, scan: ScanStats, timings: StageTimings) -> Self {
        Self {
            path: path.to_path_buf(),
            language: Language::from_path(path),
            dry_run,
            scan,
            file_context: None,
            review: Review::default(),
            applied: Vec::new(),
            manual_followups: 0,
            skipped_reason: None,
            backup: None,
            verification: None,
            timings,
            diff: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub success: bool,
    pub file_path: PathBuf,
    pub error: Option<String>,
    pub report: Option<FileReport>,
    /// The file was restored from its session backup after the error
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Files skipped after a failure with `stop_on_error`
    pub not_processed: usize,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<FileOutcome>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Owns one session: every file converted through the same `Converter`
/// shares its backups and rollback scope.
pub struct Converter {
    scanner: PatternScanner,
    classifier: ContextClassifier,
    engine: DecisionEngine,
    safety: SafetyManager,
    session: Session,
    options: ConversionOptions,
    size_delta_threshold: f64,
    prompt: Box<dyn ApprovalPrompt>,
}

impl Converter {
    pub fn new(config: &ConverterConfig, options: ConversionOptions) -> Result<Self, ConversionError> {
        let registry = config.registry();
        let library = config.learned_library(&registry)?;
        let classifier = ContextClassifier::new(registry.accessor())?;
        let scanner = PatternScanner::new(registry)?;
        let safety = SafetyManager::new(
            config.backup_dir(),
            options.max_backups.unwrap_or_else(|| config.max_backups()),
        )?;
        let size_delta_threshold = options
            .size_delta_threshold
            .unwrap_or_else(|| config.size_delta_threshold());

        Ok(Self {
            scanner,
            classifier,
            engine: DecisionEngine::new(library),
            safety,
            session: Session::new(),
            options,
            size_delta_threshold,
            prompt: Box::new(AcceptAll),
        })
    }

    pub fn with_prompt(mut self, prompt: Box<dyn ApprovalPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn safety(&self) -> &SafetyManager {
        &self.safety
    }

    /// Restore every file this converter touched to its pre-session content.
    pub fn rollback_session(&mut self) -> RollbackReport {
        self.safety.rollback_session(&mut self.session)
    }

    /// Convert one file. Errors are captured in the outcome, never raised.
    pub fn convert_file(&mut self, path: &Path) -> FileOutcome {
        let before_run = self.session.latest_version(path);
        match self.run_pipeline(path) {
            Ok(report) => FileOutcome {
                success: true,
                file_path: path.to_path_buf(),
                error: None,
                report: Some(report),
                rolled_back: false,
            },
            Err(error) => {
                let rolled_back = self.rollback_after_error(path, before_run);
                tracing::error!(path = %path.display(), %error, rolled_back, "conversion failed");
                FileOutcome {
                    success: false,
                    file_path: path.to_path_buf(),
                    error: Some(error.to_string()),
                    report: None,
                    rolled_back,
                }
            }
        }
    }

    /// Restore `path` to the backup taken by the failed run. Earlier
    /// successful runs on the same file in this session are kept.
    fn rollback_after_error(&mut self, path: &Path, before_run: u32) -> bool {
        if self.options.dry_run {
            return false;
        }
        match self.safety.rollback_file(&mut self.session, path, before_run) {
            Ok(restored) => restored.is_some(),
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "automatic rollback failed");
                false
            }
        }
    }

    /// Convert files in order. A failure stops the batch only with `stop_on_error`.
    pub fn convert_multiple_files(&mut self, paths: &[PathBuf]) -> BatchOutcome {
        let start = Instant::now();
        let mut batch = BatchOutcome {
            results: Vec::with_capacity(paths.len()),
            summary: BatchSummary {
                total: paths.len(),
                ..Default::default()
            },
        };

        for (idx, path) in paths.iter().enumerate() {
            let outcome = self.convert_file(path);
            if outcome.success {
                batch.summary.succeeded += 1;
            } else {
                batch.summary.failed += 1;
            }
            let failed = !outcome.success;
            batch.results.push(outcome);

            if failed && self.options.stop_on_error {
                batch.summary.not_processed = paths.len() - idx - 1;
                tracing::warn!(
                    path = %path.display(),
                    remaining = batch.summary.not_processed,
                    "stopping batch after failure"
                );
                break;
            }
        }

        batch.summary.elapsed_ms = elapsed_ms(start);
        tracing::info!(
            total = batch.summary.total,
            succeeded = batch.summary.succeeded,
            failed = batch.summary.failed,
            "batch finished"
        );
        batch
    }

    /// Render the report for `batch` with the configured format and output path.
    pub fn report(&self, batch: &BatchOutcome) -> Result<String, ReportError> {
        let summary = ReportSummary::from_batch(batch, Some(self.session.id()));
        generate_report(
            &summary,
            self.options.report_format,
            self.options.report_output_path.as_deref(),
        )
    }

    fn run_pipeline(&mut self, path: &Path) -> Result<FileReport, ConversionError> {
        let dry_run = self.options.dry_run;
        let mut timings = StageTimings::default();

        let bytes = fs::read(path).map_err(|source| ConversionError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let source = String::from_utf8(bytes).map_err(|_| ConversionError::NotUtf8 {
            path: path.to_path_buf(),
        })?;
        let language = Language::from_path(path);

        let start = Instant::now();
        let scan = self.scanner.scan(&source);
        timings.scan_ms = elapsed_ms(start);
        let stats = scan.stats();
        tracing::debug!(
            path = %path.display(),
            auto = stats.auto_convertible,
            ambiguous = stats.requires_review,
            "scan"
        );
        if scan.is_empty() {
            tracing::debug!(path = %path.display(), "no legacy field references");
            return Ok(FileReport::empty(path, dry_run, stats, timings));
        }

        let start = Instant::now();
        let index = SourceIndex::new(&source);
        let file_context = self.classifier.analyze_file(&index, path);
        let sites: Vec<(ViolationSite, SiteContext)> = scan
            .sites()
            .into_iter()
            .map(|site| {
                let context = self.classifier.analyze_position(&index, site.offset);
                (site.clone(), context)
            })
            .collect();
        timings.context_ms = elapsed_ms(start);

        self.safety.run_preflight(path, !dry_run).ensure(path)?;

        let backup = if dry_run {
            None
        } else {
            Some(
                self.safety
                    .create_backup(&mut self.session, path, "pre-conversion")?,
            )
        };

        let start = Instant::now();
        let review = self.engine.review_violations(sites, &file_context);
        timings.review_ms = elapsed_ms(start);
        if self.options.verbose {
            for reviewed in review.all() {
                tracing::info!(
                    line = reviewed.site.line,
                    field = %reviewed.site.field,
                    kind = %reviewed.site.kind,
                    context = %reviewed.context.context_type,
                    action = %reviewed.decision.action,
                    confidence = reviewed.decision.confidence,
                    "{}",
                    reviewed.decision.reason
                );
            }
        }

        let (applicable, followups): (Vec<&ReviewedSite>, Vec<&ReviewedSite>) = review
            .approved
            .iter()
            .partition(|r| r.site.replacement.is_some());

        let mut report = FileReport {
            path: path.to_path_buf(),
            language,
            dry_run,
            scan: stats,
            file_context: Some(file_context),
            review: Review::default(),
            applied: Vec::new(),
            manual_followups: followups.len(),
            skipped_reason: None,
            backup,
            verification: None,
            timings,
            diff: None,
        };

        if applicable.is_empty() {
            tracing::info!(path = %path.display(), "no approved automatic conversions");
            report.review = review;
            return Ok(report);
        }

        let start = Instant::now();
        let conversions = scanner::apply_auto_conversions(&source, applicable.iter().map(|r| &r.site))?;
        report.timings.apply_ms = elapsed_ms(start);

        if self.options.capture_diff {
            report.diff = Some(DiffPreview {
                before: source.clone(),
                after: conversions.converted.clone(),
            });
        }

        if dry_run {
            tracing::info!(
                path = %path.display(),
                changes = conversions.changes.len(),
                "dry run: not writing"
            );
            report.applied = conversions.changes;
            report.review = review;
            return Ok(report);
        }

        if let Some(reason) =
            self.approval_denied(path, &applicable, &source, &conversions.converted)?
        {
            tracing::info!(path = %path.display(), %reason, "conversion skipped");
            report.skipped_reason = Some(reason);
            report.review = review;
            return Ok(report);
        }

        edit::write_source(path, conversions.converted.as_bytes())?;
        tracing::info!(
            path = %path.display(),
            changes = conversions.changes.len(),
            "wrote converted file"
        );

        let start = Instant::now();
        let verification = validate::verify_written(
            path,
            &source,
            &conversions.converted,
            language,
            self.size_delta_threshold,
        )?;
        report.timings.verify_ms = elapsed_ms(start);

        report.verification = Some(verification);
        report.applied = conversions.changes;
        report.review = review;
        Ok(report)
    }

    /// `None` if the approved conversions may be written, else the reason not to.
    fn approval_denied(
        &mut self,
        path: &Path,
        sites: &[&ReviewedSite],
        original: &str,
        converted: &str,
    ) -> Result<Option<String>, ConversionError> {
        if self.options.auto_approve {
            return Ok(None);
        }
        if !self.options.interactive {
            return Ok(Some(
                "approved conversions need confirmation (auto-approve or interactive mode)"
                    .to_string(),
            ));
        }
        let request = ApprovalRequest {
            path,
            sites,
            original,
            converted,
        };
        let confirmed = self
            .prompt
            .confirm(&request)
            .map_err(|source| ConversionError::Prompt {
                path: path.to_path_buf(),
                source,
            })?;
        Ok((!confirmed).then(|| "declined at the approval prompt".to_string()))
    }
}
