use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use field_mapper_converter::config::{load_or_default, ConverterConfig};
use field_mapper_converter::converter::{
    ApprovalPrompt, ApprovalRequest, ConversionOptions, Converter,
};
use field_mapper_converter::report::ReportFormat;
use field_mapper_converter::safety::{format_size, SafetyManager, Session, VersionSelector};
use field_mapper_converter::scanner::PatternScanner;
use field_mapper_converter::walk::collect_files;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "field-mapper-converter")]
#[command(about = "Migrate legacy field-name access to a FieldMapper accessor", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Configuration file (defaults to ./field-mapper.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backup directory (overrides the config)
    #[arg(long)]
    backup_dir: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct WalkArgs {
    /// Glob of files to include under directory arguments (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Glob of paths to exclude under directory arguments (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Stop after this many files
    #[arg(long)]
    max_files: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert files or directories
    Convert {
        /// Files or directories to convert
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Compute and report, write nothing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Apply approved conversions without asking
        #[arg(short = 'y', long)]
        yes: bool,

        /// Never prompt; approved conversions are skipped unless --yes
        #[arg(long)]
        no_interactive: bool,

        /// Report format: plain, structured (json) or markup (markdown)
        #[arg(short, long, default_value = "plain")]
        format: ReportFormat,

        /// Write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Backups kept per file
        #[arg(long)]
        max_backups: Option<usize>,

        /// Stop the batch at the first failing file
        #[arg(long)]
        stop_on_error: bool,

        /// Show a unified diff of every converted file
        #[arg(short, long)]
        diff: bool,

        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// List legacy field references without converting
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Restore a file from its backups
    Restore {
        file: PathBuf,

        /// Backup version (latest if omitted)
        #[arg(long)]
        version: Option<u32>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Restore every file of a past session to its pre-session content
    Rollback {
        #[arg(long)]
        session: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Show backup statistics
    Backups {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Verify the checksum of every backup
    Audit {
        #[command(flatten)]
        common: CommonArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert {
            paths,
            dry_run,
            yes,
            no_interactive,
            format,
            output,
            max_backups,
            stop_on_error,
            diff,
            common,
            walk,
        } => {
            let options = ConversionOptions {
                dry_run,
                auto_approve: yes,
                interactive: !no_interactive && io::stdin().is_terminal(),
                report_format: format,
                report_output_path: output,
                max_backups,
                verbose: cli.verbose,
                stop_on_error,
                size_delta_threshold: None,
                capture_diff: diff,
            };
            cmd_convert(&paths, options, &common, &walk)
        }

        Commands::Scan {
            paths,
            common,
            walk,
        } => cmd_scan(&paths, &common, &walk),

        Commands::Restore {
            file,
            version,
            common,
        } => cmd_restore(&file, version, &common),

        Commands::Rollback { session, common } => cmd_rollback(&session, &common),

        Commands::Backups { common } => cmd_backups(&common),

        Commands::Audit { common } => cmd_audit(&common),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

/// Helper: Load the config and apply command-line overrides
fn load_config(common: &CommonArgs) -> Result<ConverterConfig> {
    let cwd = env::current_dir().context("cannot determine working directory")?;
    let mut config = load_or_default(common.config.as_deref(), &cwd)?;
    if let Some(dir) = &common.backup_dir {
        config.backup.dir = Some(dir.clone());
    }
    Ok(config)
}

fn safety_manager(common: &CommonArgs) -> Result<SafetyManager> {
    let config = load_config(common)?;
    Ok(SafetyManager::new(config.backup_dir(), config.max_backups())?)
}

/// Helper: Expand directory arguments into a sorted, de-duplicated file list
fn gather_files(paths: &[PathBuf], walk: &WalkArgs) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for path in paths {
        files.extend(collect_files(path, &walk.include, &walk.exclude, None)?);
    }
    let mut files: Vec<PathBuf> = files.into_iter().collect();
    if let Some(max) = walk.max_files {
        files.truncate(max);
    }
    Ok(files)
}

/// Helper: Show unified diff between original and converted content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (converted)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Asks on the terminal before approved conversions are written.
struct TerminalPrompt;

impl ApprovalPrompt for TerminalPrompt {
    fn confirm(&mut self, request: &ApprovalRequest<'_>) -> io::Result<bool> {
        println!(
            "\n{}",
            format!(
                "{} approved conversion(s) in {}",
                request.sites.len(),
                request.path.display()
            )
            .bold()
        );
        for reviewed in request.sites {
            let after = match reviewed.site.replacement.as_deref() {
                Some("") => "(removed)".dimmed().to_string(),
                Some(text) => text.green().to_string(),
                None => String::new(),
            };
            println!(
                "  line {:>4}: {} -> {} ({:.0}%)",
                reviewed.site.line,
                reviewed.site.matched.trim().red(),
                after,
                reviewed.decision.confidence * 100.0
            );
        }
        print!("Apply these changes? [y/N] ");
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

fn cmd_convert(
    paths: &[PathBuf],
    options: ConversionOptions,
    common: &CommonArgs,
    walk: &WalkArgs,
) -> Result<()> {
    let config = load_config(common)?;
    let files = gather_files(paths, walk)?;
    if files.is_empty() {
        println!("{}", "No candidate files found".yellow());
        return Ok(());
    }

    let dry_run = options.dry_run;
    let show_diff = options.capture_diff;
    let to_file = options.report_output_path.clone();

    println!("Converting {} file(s)...", files.len());
    if dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }

    let mut converter =
        Converter::new(&config, options)?.with_prompt(Box::new(TerminalPrompt));
    let batch = converter.convert_multiple_files(&files);

    if show_diff {
        for report in batch.results.iter().filter_map(|o| o.report.as_ref()) {
            if let Some(diff) = &report.diff {
                display_diff(&report.path, &diff.before, &diff.after);
            }
        }
    }

    let rendered = converter.report(&batch)?;
    match &to_file {
        Some(path) => println!("Report written to {}", path.display()),
        None => {
            println!();
            print!("{rendered}");
        }
    }

    if !dry_run && !converter.session().is_empty() {
        let id = converter.session().id();
        println!(
            "\n{}",
            format!("Undo with: field-mapper-converter rollback --session {id}").dimmed()
        );
    }

    if !batch.all_succeeded() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_scan(paths: &[PathBuf], common: &CommonArgs, walk: &WalkArgs) -> Result<()> {
    let config = load_config(common)?;
    let scanner = PatternScanner::new(config.registry())?;
    let files = gather_files(paths, walk)?;

    let mut total = 0;
    let mut auto = 0;
    let mut manual_minutes = 0.0;
    let mut tool_minutes = 0.0;

    for file in &files {
        let source = match fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{} {}: {}", "Skipping".yellow(), file.display(), e);
                continue;
            }
        };
        let result = scanner.scan(&source);
        if result.is_empty() {
            continue;
        }

        println!("{}", file.display().to_string().bold());
        for site in result.sites() {
            let proposal = match site.replacement.as_deref() {
                Some("") => "delete".dimmed().to_string(),
                Some(text) => text.green().to_string(),
                None => "needs review".yellow().to_string(),
            };
            println!(
                "  {:>5}  {:<18} {} -> {}",
                site.line,
                site.kind.as_str(),
                site.matched.trim(),
                proposal
            );
        }

        let stats = result.stats();
        total += stats.total;
        auto += stats.auto_convertible;
        manual_minutes += stats.manual_minutes;
        tool_minutes += stats.tool_minutes;
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} file(s) scanned", files.len());
    println!("  {} site(s)", total);
    println!("  {} auto-convertible", format!("{auto}").green());
    println!("  {} need review", format!("{}", total - auto).yellow());
    println!(
        "  estimated effort: {:.1} min by hand, {:.1} min with the converter",
        manual_minutes, tool_minutes
    );

    Ok(())
}

fn cmd_restore(file: &Path, version: Option<u32>, common: &CommonArgs) -> Result<()> {
    let manager = safety_manager(common)?;
    let mut session = Session::new();
    let selector = version.map_or(VersionSelector::Latest, VersionSelector::Version);

    let outcome = manager.restore_backup(&mut session, file, selector)?;
    println!(
        "{} {} from backup v{}",
        "Restored".green(),
        outcome.path.display(),
        outcome.restored.version()
    );
    if let Some(snapshot) = outcome.snapshot {
        println!(
            "{}",
            format!("Previous content saved as v{}", snapshot.version()).dimmed()
        );
    }
    Ok(())
}

fn cmd_rollback(session_id: &str, common: &CommonArgs) -> Result<()> {
    let manager = safety_manager(common)?;
    let mut session = Session::load(&manager, session_id)?;
    if session.is_empty() {
        anyhow::bail!("No backups recorded for session {session_id}");
    }

    let report = manager.rollback_session(&mut session);
    for restored in &report.restored {
        println!(
            "  {} {} (v{})",
            "✓".green(),
            restored.path.display(),
            restored.version
        );
    }
    for failure in &report.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.path.display(),
            failure.error
        );
    }
    println!(
        "\nRolled back {} file(s), {} failed",
        report.restored.len(),
        report.failed.len()
    );

    if !report.is_complete() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_backups(common: &CommonArgs) -> Result<()> {
    let stats = safety_manager(common)?.backup_stats()?;

    println!("Backup directory: {}", stats.dir.display());
    println!(
        "  {} backup(s), {}",
        stats.total_backups,
        format_size(stats.total_bytes)
    );
    if let Some(oldest) = &stats.oldest {
        println!("  oldest: {}", oldest.created_at.to_rfc3339());
    }
    if let Some(newest) = &stats.newest {
        println!("  newest: {}", newest.created_at.to_rfc3339());
    }
    for (path, file) in &stats.per_file {
        println!(
            "  {} ({} backup(s), {})",
            path.display(),
            file.count,
            format_size(file.bytes)
        );
    }

    Ok(())
}

fn cmd_audit(common: &CommonArgs) -> Result<()> {
    let reports = safety_manager(common)?.audit()?;
    let corrupted: Vec<_> = reports.iter().filter(|r| !r.ok).collect();

    for report in &corrupted {
        println!(
            "  {} {} v{}: expected {}, found {}",
            "✗".red(),
            report.original_path.display(),
            report.version,
            report.expected,
            report
                .actual
                .as_deref()
                .or(report.error.as_deref())
                .unwrap_or("nothing")
        );
    }
    println!(
        "Audited {} backup(s): {} ok, {} corrupted",
        reports.len(),
        reports.len() - corrupted.len(),
        corrupted.len()
    );

    if !corrupted.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
