use crate::common::{auto_options, config_in, read, write_file};
use field_mapper_converter::safety::{SafetyError, SafetyManager, Session, VersionSelector};
use field_mapper_converter::converter::{ApprovalPrompt, ApprovalRequest};
use field_mapper_converter::{ConversionOptions, Converter};
use pretty_assertions::assert_eq;
use std::fs;
use std::io;
use tempfile::TempDir;

#[test]
fn every_written_file_has_a_backup_of_its_original() {
    let temp = TempDir::new().unwrap();
    let original = "x.legacyField = 5;\n";
    let file = write_file(temp.path(), "a.js", original);

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let report = converter.convert_file(&file).report.unwrap();
    assert_eq!(report.applied.len(), 1);

    let backup = report.backup.expect("backup recorded before write");
    assert_eq!(fs::read_to_string(&backup.artifact).unwrap(), original);
    assert!(backup.sidecar.is_file());
    assert_eq!(converter.session().anchor(&file), Some(&backup));
}

#[test]
fn session_rollback_restores_every_file() {
    let temp = TempDir::new().unwrap();
    let originals = [
        ("a.js", "x.legacyField = 1;\n"),
        ("b.js", "const v = a.legacyField || b.legacyField;\n"),
    ];
    let files: Vec<_> = originals
        .iter()
        .map(|(name, content)| write_file(temp.path(), name, content))
        .collect();

    let mut converter = Converter::new(&config_in(&temp), auto_options()).unwrap();
    let batch = converter.convert_multiple_files(&files);
    assert!(batch.all_succeeded());
    // A later edit and conversion adds a second backup; rollback must still
    // reach the first one
    let edited = format!("{}y.legacyField = 2;\n", read(&files[0]));
    fs::write(&files[0], edited).unwrap();
    assert!(converter.convert_file(&files[0]).success);
    assert_eq!(converter.session().backups_for(&files[0]).len(), 2);
    for (file, (_, content)) in files.iter().zip(originals) {
        assert_ne!(read(file), content);
    }

    let report = converter.rollback_session();
    assert!(report.is_complete(), "{:?}", report.failed);
    assert_eq!(report.restored.len(), 2);
    for (file, (_, content)) in files.iter().zip(originals) {
        assert_eq!(read(file), content);
    }
}

#[test]
fn past_session_can_be_rolled_back_from_disk() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "a.js", "x.legacyField = 1;\n");

    let config = config_in(&temp);
    let session_id = {
        let mut converter = Converter::new(&config, auto_options()).unwrap();
        assert!(converter.convert_file(&file).success);
        converter.session().id().to_string()
    };

    let manager = SafetyManager::new(config.backup_dir(), config.max_backups()).unwrap();
    let mut session = Session::load(&manager, &session_id).unwrap();
    assert_eq!(session.backup_count(), 1);

    let report = manager.rollback_session(&mut session);
    assert!(report.is_complete());
    assert_eq!(read(&file), "x.legacyField = 1;\n");
}

#[test]
fn backup_then_restore_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let content = "const a = 1;\r\nconst b = 'ü';\n";
    let file = write_file(temp.path(), "a.js", content);
    let manager = SafetyManager::new(temp.path().join("backups"), 5).unwrap();
    let mut session = Session::new();

    let record = manager.create_backup(&mut session, &file, "test").unwrap();
    assert!(manager.verify_integrity(&record).ok);

    let outcome = manager
        .restore_backup(&mut session, &file, VersionSelector::Latest)
        .unwrap();
    assert_eq!(outcome.restored.version(), record.version());
    assert_eq!(fs::read(&file).unwrap(), content.as_bytes());
    assert!(manager.audit().unwrap().iter().all(|r| r.ok));
}

#[test]
fn tampered_backup_is_refused() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "a.js", "original\n");
    let manager = SafetyManager::new(temp.path().join("backups"), 5).unwrap();
    let mut session = Session::new();

    let record = manager.create_backup(&mut session, &file, "test").unwrap();
    fs::write(&record.artifact, "tampered\n").unwrap();
    fs::write(&file, "edited\n").unwrap();

    let result = manager.restore_backup(&mut session, &file, VersionSelector::Version(record.version()));
    assert!(matches!(result, Err(SafetyError::Integrity { .. })));
    assert_eq!(read(&file), "edited\n");
    assert!(!manager.verify_integrity(&record).ok);
}

#[test]
fn retention_keeps_versions_monotonic() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "a.js", "v0\n");
    let manager = SafetyManager::new(temp.path().join("backups"), 2).unwrap();

    let mut versions = Vec::new();
    for i in 0..4 {
        let mut session = Session::new();
        fs::write(&file, format!("v{i}\n")).unwrap();
        versions.push(manager.create_backup(&mut session, &file, "test").unwrap().version());
    }

    assert_eq!(versions, vec![1, 2, 3, 4]);
    let kept: Vec<u32> = manager
        .backups_for(&file)
        .unwrap()
        .iter()
        .map(|r| r.version())
        .collect();
    assert_eq!(kept, vec![3, 4]);
}

/// Accepts the first request, then fails as if the terminal went away.
struct FailsAfterFirst {
    calls: usize,
}

impl ApprovalPrompt for FailsAfterFirst {
    fn confirm(&mut self, _request: &ApprovalRequest<'_>) -> io::Result<bool> {
        self.calls += 1;
        if self.calls > 1 {
            return Err(io::Error::other("terminal closed"));
        }
        Ok(true)
    }
}

fn prompting_options() -> ConversionOptions {
    ConversionOptions {
        auto_approve: false,
        interactive: true,
        ..Default::default()
    }
}

#[test]
fn failed_verification_restores_the_original_bytes() {
    let temp = TempDir::new().unwrap();
    let original = "const a = 1;\r\nx.legacyField = 5;\n";
    let file = write_file(temp.path(), "a.js", original);

    let mut config = config_in(&temp);
    // Renders `x[lookup(('CANON_KEY')]`, which no longer parses
    config.accessor.expression = Some("lookup(".to_string());

    let mut converter = Converter::new(&config, auto_options()).unwrap();
    let outcome = converter.convert_file(&file);

    assert!(!outcome.success);
    assert!(outcome.rolled_back);
    assert!(outcome.error.as_deref().unwrap().contains("Verification failed"));
    assert_eq!(fs::read(&file).unwrap(), original.as_bytes());
    assert!(converter.session().anchor(&file).is_some());
}

#[test]
fn prompt_error_fails_the_file_and_restores_it() {
    let temp = TempDir::new().unwrap();
    let original = "x.legacyField = 5;\n";
    let file = write_file(temp.path(), "a.js", original);

    let mut converter = Converter::new(&config_in(&temp), prompting_options())
        .unwrap()
        .with_prompt(Box::new(FailsAfterFirst { calls: 1 }));
    let outcome = converter.convert_file(&file);

    assert!(!outcome.success);
    assert!(outcome.rolled_back);
    assert!(outcome.error.as_deref().unwrap().contains("terminal closed"));
    assert_eq!(read(&file), original);
}

#[test]
fn failed_rerun_keeps_the_earlier_conversion() {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "a.js", "x.legacyField = 5;\n");

    let mut converter = Converter::new(&config_in(&temp), prompting_options())
        .unwrap()
        .with_prompt(Box::new(FailsAfterFirst { calls: 0 }));
    assert!(converter.convert_file(&file).success);

    let edited = format!("{}y.legacyField = 2;\n", read(&file));
    fs::write(&file, &edited).unwrap();
    let outcome = converter.convert_file(&file);

    assert!(!outcome.success);
    assert!(outcome.rolled_back);
    assert_eq!(read(&file), edited);
    assert_eq!(
        read(&file),
        "x[lookup('CANON_KEY')] = 5;\ny.legacyField = 2;\n"
    );
}
