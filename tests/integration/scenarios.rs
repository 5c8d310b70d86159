use crate::common::{auto_options, config_in, read, write_file};
use field_mapper_converter::report::{generate_report, ReportFormat, ReportSummary, RiskLevel};
use field_mapper_converter::{Action, ConversionOptions, Converter};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn scenario_a_member_assignment_is_converted() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "a.js", "x.legacyField = 5;\n");

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let outcome = converter.convert_file(&file);

    assert!(outcome.success, "{:?}", outcome.error);
    let report = outcome.report.unwrap();
    assert_eq!(report.scan.auto_convertible, 1);
    assert_eq!(report.review.approved.len(), 1);
    assert_eq!(read(&file), "x[lookup('CANON_KEY')] = 5;\n");
}

#[test]
fn scenario_b_comment_is_excluded() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "b.js", "// x.legacyField\n");

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let report = converter.convert_file(&file).report.unwrap();

    assert!(report.applied.is_empty());
    assert!(report.review.approved.is_empty());
    for reviewed in report.review.all() {
        assert!(!reviewed.context.is_safe_to_modify);
        assert_eq!(reviewed.decision.action, Action::Reject);
    }
    assert_eq!(read(&file), "// x.legacyField\n");
}

#[test]
fn scenario_c_fallback_is_deleted() {
    let temp = TempDir::new().unwrap();
    let file = write_file(
        temp.path(),
        "c.js",
        "const v = a.legacyField || b.legacyField;\n",
    );

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let outcome = converter.convert_file(&file);

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(read(&file), "const v = a[lookup('CANON_KEY')];\n");
}

#[test]
fn scenario_d_batch_continues_past_failure() {
    let temp = TempDir::new().unwrap();
    let first = write_file(temp.path(), "1.js", "x.legacyField = 1;\n");
    let second = write_file(temp.path(), "2.js", [0xff, 0xfe, b'x', b'\n']);
    let third = write_file(temp.path(), "3.js", "y.legacyField = 3;\n");

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let batch = converter.convert_multiple_files(&[first.clone(), second.clone(), third.clone()]);

    let success: Vec<bool> = batch.results.iter().map(|o| o.success).collect();
    assert_eq!(success, vec![true, false, true]);
    assert!(batch.results[1].error.as_deref().unwrap().contains("UTF-8"));
    assert_eq!(batch.summary.succeeded, 2);
    assert_eq!(batch.summary.failed, 1);
    assert_eq!(read(&first), "x[lookup('CANON_KEY')] = 1;\n");
    assert_eq!(read(&third), "y[lookup('CANON_KEY')] = 3;\n");
}

#[test]
fn multiple_edits_keep_untouched_text() {
    let temp = TempDir::new().unwrap();
    let source = "a.legacyField = 1;\n// keep this\nb.legacyField = 2;\nc.legacyField = 3;\n";
    let file = write_file(temp.path(), "multi.js", source);

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let report = converter.convert_file(&file).report.unwrap();

    assert_eq!(report.applied.len(), 3);
    assert_eq!(
        read(&file),
        "a[lookup('CANON_KEY')] = 1;\n// keep this\nb[lookup('CANON_KEY')] = 2;\nc[lookup('CANON_KEY')] = 3;\n"
    );
}

#[test]
fn ambiguous_sites_are_never_rewritten() {
    let temp = TempDir::new().unwrap();
    let source = "const t = a.legacyField.total;\nconst w = data['legacyField'];\n";
    let file = write_file(temp.path(), "amb.js", source);

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let report = converter.convert_file(&file).report.unwrap();

    assert_eq!(report.scan.auto_convertible, 0);
    assert!(report.scan.requires_review >= 2);
    assert!(report.applied.is_empty());
    assert_eq!(read(&file), source);
}

#[test]
fn second_run_finds_nothing_to_convert() {
    let temp = TempDir::new().unwrap();
    let file = write_file(
        temp.path(),
        "idem.js",
        "x.legacyField = 5;\nconst v = a.legacyField || b.legacyField;\n",
    );

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    assert!(converter.convert_file(&file).success);
    let converted = read(&file);

    let again = converter.convert_file(&file).report.unwrap();
    assert_eq!(again.scan.auto_convertible, 0);
    assert_eq!(read(&file), converted);
}

#[test]
fn dry_run_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "dry.js", "x.legacyField = 5;\n");

    let options = ConversionOptions {
        dry_run: true,
        ..auto_options()
    };
    let mut converter = Converter::new(&config_in(&temp), options).unwrap();
    let outcome = converter.convert_file(&file);

    assert!(outcome.success);
    assert_eq!(outcome.report.unwrap().applied.len(), 1);
    assert_eq!(read(&file), "x.legacyField = 5;\n");
    assert!(!temp.path().join("backups").exists());
    assert!(converter.session().is_empty());
}

#[test]
fn batch_report_is_format_independent() {
    let temp = TempDir::new().unwrap();
    let a = write_file(temp.path(), "a.js", "x.legacyField = 5;\n");
    let b = write_file(temp.path(), "b.js", "// x.legacyField\n");

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let batch = converter.convert_multiple_files(&[a, b]);
    let summary = ReportSummary::from_batch(&batch, Some(converter.session().id()));

    assert_eq!(summary.files, 2);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.rejected, summary.excluded);
    assert_ne!(summary.risk_level, RiskLevel::None);

    let json = generate_report(&summary, ReportFormat::Structured, None).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["approved"], 1);
    assert_eq!(value["applied"], 1);

    let out = temp.path().join("reports/run.md");
    let markdown = generate_report(&summary, ReportFormat::Markup, Some(&out)).unwrap();
    assert!(markdown.contains("| Approved | 1 |"));
    assert_eq!(read(&out), markdown);
}
