use super::checksum::{path_tag, sha256_hex};
use super::session::Session;
use super::{normalize_path, SafetyError, SafetyManager};
use crate::edit::{atomic_write, write_source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const ARTIFACT_EXT: &str = ".backup";
const SIDECAR_EXT: &str = ".meta.json";

/// Sidecar contents of one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub original_path: PathBuf,
    pub size: u64,
    pub mtime: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    pub session_id: String,
    pub checksum: String,
    pub version: u32,
}

/// A backup artifact on disk and its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub artifact: PathBuf,
    pub sidecar: PathBuf,
    pub metadata: BackupMetadata,
}

impl BackupRecord {
    pub fn version(&self) -> u32 {
        self.metadata.version
    }

    pub fn original_path(&self) -> &Path {
        &self.metadata.original_path
    }

    fn load(sidecar: &Path) -> Result<Self, SafetyError> {
        let text = fs::read_to_string(sidecar).map_err(|source| SafetyError::Io {
            path: sidecar.to_path_buf(),
            source,
        })?;
        let metadata: BackupMetadata =
            serde_json::from_str(&text).map_err(|source| SafetyError::Metadata {
                path: sidecar.to_path_buf(),
                source,
            })?;
        let artifact = artifact_for(sidecar);
        Ok(Self {
            artifact,
            sidecar: sidecar.to_path_buf(),
            metadata,
        })
    }
}

/// Which backup of a file to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Version(u32),
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub path: PathBuf,
    pub restored: BackupRecord,
    /// Backup of the content that was overwritten; `None` if the file was gone
    pub snapshot: Option<BackupRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub artifact: PathBuf,
    pub original_path: PathBuf,
    pub version: u32,
    pub ok: bool,
    pub expected: String,
    pub actual: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileBackupStats {
    pub count: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub dir: PathBuf,
    pub total_backups: usize,
    pub total_bytes: u64,
    pub oldest: Option<BackupMetadata>,
    pub newest: Option<BackupMetadata>,
    pub per_file: BTreeMap<PathBuf, FileBackupStats>,
}

fn artifact_for(sidecar: &Path) -> PathBuf {
    let name = sidecar.to_string_lossy();
    PathBuf::from(name.strip_suffix(SIDECAR_EXT).unwrap_or(&name).to_string())
}

fn sidecar_for(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(SIDECAR_EXT);
    PathBuf::from(name)
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

impl SafetyManager {
    /// `<file-name>.<path-tag>.v` prefix shared by every backup of `normalized`.
    fn artifact_prefix(&self, normalized: &Path) -> String {
        let file_name = normalized
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        format!(
            "{file_name}.{}.v",
            path_tag(&normalized.to_string_lossy())
        )
    }

    fn sidecars(&self) -> Result<Vec<PathBuf>, SafetyError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| SafetyError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut sidecars: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.to_string_lossy().ends_with(SIDECAR_EXT))
            .collect();
        sidecars.sort();
        Ok(sidecars)
    }

    /// Every committed backup in the directory, oldest first.
    ///
    /// Sidecars that fail to parse or lack an artifact are skipped.
    pub fn all_backups(&self) -> Result<Vec<BackupRecord>, SafetyError> {
        let mut records = Vec::new();
        for sidecar in self.sidecars()? {
            match BackupRecord::load(&sidecar) {
                Ok(record) if record.artifact.is_file() => records.push(record),
                Ok(record) => {
                    tracing::warn!(artifact = %record.artifact.display(), "backup artifact missing")
                }
                Err(e) => tracing::warn!(error = %e, "skipping unreadable backup metadata"),
            }
        }
        records.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then(a.metadata.version.cmp(&b.metadata.version))
        });
        Ok(records)
    }

    /// Backups of one file, ordered by version.
    ///
    /// Sidecars that fail to parse are skipped with a warning so one damaged
    /// entry cannot block restores of the others.
    pub fn backups_for(&self, path: &Path) -> Result<Vec<BackupRecord>, SafetyError> {
        let normalized = normalize_path(path);
        let prefix = self.artifact_prefix(&normalized);
        let mut records = Vec::new();
        for sidecar in self.sidecars_with_prefix(&prefix)? {
            match BackupRecord::load(&sidecar) {
                Ok(record)
                    if record.metadata.original_path == normalized
                        && record.artifact.is_file() =>
                {
                    records.push(record)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    sidecar = %sidecar.display(),
                    error = %e,
                    "skipping unreadable backup metadata"
                ),
            }
        }
        records.sort_by_key(|r| r.metadata.version);
        Ok(records)
    }

    fn sidecars_with_prefix(&self, prefix: &str) -> Result<Vec<PathBuf>, SafetyError> {
        Ok(self
            .sidecars()?
            .into_iter()
            .filter(|sidecar| {
                sidecar
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(prefix))
            })
            .collect())
    }

    /// Highest version named on disk, readable or not.
    fn highest_named_version(&self, normalized: &Path) -> Result<u32, SafetyError> {
        let prefix = self.artifact_prefix(normalized);
        Ok(self
            .sidecars_with_prefix(&prefix)?
            .iter()
            .filter_map(|sidecar| {
                let name = sidecar.file_name()?.to_string_lossy().into_owned();
                name.strip_prefix(&prefix)?
                    .strip_suffix(SIDECAR_EXT)?
                    .strip_suffix(ARTIFACT_EXT)?
                    .parse::<u32>()
                    .ok()
            })
            .max()
            .unwrap_or(0))
    }

    fn next_version(&self, session: &Session, normalized: &Path) -> Result<u32, SafetyError> {
        let on_disk = self
            .backups_for(normalized)?
            .last()
            .map(|r| r.metadata.version)
            .unwrap_or(0)
            .max(self.highest_named_version(normalized)?);
        let in_session = session
            .backups_for(normalized)
            .iter()
            .map(|r| r.metadata.version)
            .max()
            .unwrap_or(0);
        Ok(on_disk.max(in_session) + 1)
    }

    /// Back up the current bytes of `path` and register the backup in `session`.
    ///
    /// Returns only once both the artifact and its sidecar are durable.
    pub fn create_backup(
        &self,
        session: &mut Session,
        path: &Path,
        reason: &str,
    ) -> Result<BackupRecord, SafetyError> {
        let normalized = normalize_path(path);
        let content = fs::read(&normalized).map_err(|source| SafetyError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let mtime = fs::metadata(&normalized)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        self.ensure_dir()?;
        let version = self.next_version(session, &normalized)?;
        let artifact = self.dir.join(format!(
            "{}{version}{ARTIFACT_EXT}",
            self.artifact_prefix(&normalized)
        ));
        let sidecar = sidecar_for(&artifact);

        let metadata = BackupMetadata {
            original_path: normalized.clone(),
            size: content.len() as u64,
            mtime,
            created_at: Utc::now(),
            reason: reason.to_string(),
            session_id: session.id().to_string(),
            checksum: sha256_hex(&content),
            version,
        };

        atomic_write(&artifact, &content).map_err(|source| SafetyError::Persist {
            path: artifact.clone(),
            source,
        })?;
        let json = serde_json::to_vec_pretty(&metadata).map_err(|source| SafetyError::Metadata {
            path: sidecar.clone(),
            source,
        })?;
        atomic_write(&sidecar, &json).map_err(|source| SafetyError::Persist {
            path: sidecar.clone(),
            source,
        })?;

        let record = BackupRecord {
            artifact,
            sidecar,
            metadata,
        };
        tracing::info!(
            path = %normalized.display(),
            version,
            reason,
            "backup created"
        );
        session.record(record.clone());

        self.prune(session, &normalized, &record.artifact)?;
        Ok(record)
    }

    /// Remove the oldest backups of a file beyond `max_backups`.
    ///
    /// Neither the session's rollback anchor for the file nor the backup
    /// just created (`newest`) is ever removed.
    fn prune(
        &self,
        session: &mut Session,
        normalized: &Path,
        newest: &Path,
    ) -> Result<(), SafetyError> {
        let mut backups = self.backups_for(normalized)?;
        if backups.len() <= self.max_backups {
            return Ok(());
        }
        backups.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then(a.metadata.version.cmp(&b.metadata.version))
        });

        let anchor = session.anchor(normalized).map(|r| r.artifact.clone());
        let mut excess = backups.len() - self.max_backups;
        for record in backups {
            if excess == 0 {
                break;
            }
            if anchor.as_ref() == Some(&record.artifact) || record.artifact == newest {
                continue;
            }
            // Sidecar first: without it the artifact is no longer a backup
            fs::remove_file(&record.sidecar).map_err(|source| SafetyError::Io {
                path: record.sidecar.clone(),
                source,
            })?;
            fs::remove_file(&record.artifact).map_err(|source| SafetyError::Io {
                path: record.artifact.clone(),
                source,
            })?;
            session.forget(&record.artifact);
            tracing::debug!(artifact = %record.artifact.display(), "pruned backup");
            excess -= 1;
        }
        Ok(())
    }

    /// Read a backup's bytes, failing if they no longer match the checksum.
    pub fn read_verified(&self, record: &BackupRecord) -> Result<Vec<u8>, SafetyError> {
        let bytes = fs::read(&record.artifact).map_err(|source| SafetyError::Input {
            path: record.artifact.clone(),
            source,
        })?;
        let actual = sha256_hex(&bytes);
        if actual != record.metadata.checksum {
            return Err(SafetyError::Integrity {
                path: record.artifact.clone(),
                expected: record.metadata.checksum.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Restore `path` from one of its backups.
    ///
    /// The current content is snapshotted first so the restore can itself be
    /// undone. The backup is verified before it is written and the written
    /// file is verified after.
    pub fn restore_backup(
        &self,
        session: &mut Session,
        path: &Path,
        selector: VersionSelector,
    ) -> Result<RestoreOutcome, SafetyError> {
        let backups = self.backups_for(path)?;
        let record = match selector {
            VersionSelector::Latest => backups.last().cloned(),
            VersionSelector::Version(version) => {
                let found = backups.iter().find(|r| r.metadata.version == version).cloned();
                if found.is_none() && !backups.is_empty() {
                    return Err(SafetyError::VersionNotFound {
                        path: path.to_path_buf(),
                        version,
                    });
                }
                found
            }
        }
        .ok_or_else(|| SafetyError::NoBackup {
            path: path.to_path_buf(),
        })?;

        self.restore_record(session, path, &record)
    }

    /// Restore `path` from a specific record.
    pub fn restore_record(
        &self,
        session: &mut Session,
        path: &Path,
        record: &BackupRecord,
    ) -> Result<RestoreOutcome, SafetyError> {
        let bytes = self.read_verified(record)?;
        let target = record.metadata.original_path.clone();

        let snapshot = if target.is_file() {
            Some(self.create_backup(session, &target, "pre-restore snapshot")?)
        } else {
            None
        };

        write_source(&target, &bytes).map_err(|source| SafetyError::Persist {
            path: target.clone(),
            source,
        })?;

        let written = fs::read(&target).map_err(|source| SafetyError::Input {
            path: target.clone(),
            source,
        })?;
        let actual = sha256_hex(&written);
        if actual != record.metadata.checksum {
            return Err(SafetyError::Integrity {
                path: target,
                expected: record.metadata.checksum.clone(),
                actual,
            });
        }

        tracing::info!(
            path = %path.display(),
            version = record.metadata.version,
            "restored backup"
        );
        Ok(RestoreOutcome {
            path: target,
            restored: record.clone(),
            snapshot,
        })
    }

    /// Recompute a backup's checksum without touching anything.
    pub fn verify_integrity(&self, record: &BackupRecord) -> IntegrityReport {
        let (actual, error) = match fs::read(&record.artifact) {
            Ok(bytes) => (Some(sha256_hex(&bytes)), None),
            Err(e) => (None, Some(e.to_string())),
        };
        IntegrityReport {
            artifact: record.artifact.clone(),
            original_path: record.metadata.original_path.clone(),
            version: record.metadata.version,
            ok: actual.as_deref() == Some(record.metadata.checksum.as_str()),
            expected: record.metadata.checksum.clone(),
            actual,
            error,
        }
    }

    /// Integrity of every backup in the directory.
    pub fn audit(&self) -> Result<Vec<IntegrityReport>, SafetyError> {
        Ok(self
            .all_backups()?
            .iter()
            .map(|record| self.verify_integrity(record))
            .collect())
    }

    pub fn backup_stats(&self) -> Result<BackupStats, SafetyError> {
        let backups = self.all_backups()?;
        let mut per_file: BTreeMap<PathBuf, FileBackupStats> = BTreeMap::new();
        let mut total_bytes = 0;
        for record in &backups {
            let bytes = fs::metadata(&record.artifact).map(|m| m.len()).unwrap_or(0);
            total_bytes += bytes;
            let entry = per_file
                .entry(record.metadata.original_path.clone())
                .or_default();
            entry.count += 1;
            entry.bytes += bytes;
        }
        Ok(BackupStats {
            dir: self.dir.clone(),
            total_backups: backups.len(),
            total_bytes,
            oldest: backups.first().map(|r| r.metadata.clone()),
            newest: backups.last().map(|r| r.metadata.clone()),
            per_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(max_backups: usize) -> (TempDir, SafetyManager, Session, PathBuf) {
        let temp = TempDir::new().unwrap();
        let manager = SafetyManager::new(temp.path().join("backups"), max_backups).unwrap();
        let file = temp.path().join("app.js");
        fs::write(&file, "const v = a.views;\n").unwrap();
        (temp, manager, Session::new(), file)
    }

    #[test]
    fn test_create_backup_writes_artifact_and_sidecar() {
        let (_temp, manager, mut session, file) = setup(10);
        let record = manager.create_backup(&mut session, &file, "test").unwrap();

        assert_eq!(record.version(), 1);
        assert!(record.artifact.is_file());
        assert!(record.sidecar.is_file());
        assert_eq!(fs::read(&record.artifact).unwrap(), fs::read(&file).unwrap());
        assert_eq!(record.metadata.session_id, session.id());

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&record.sidecar).unwrap()).unwrap();
        for key in [
            "originalPath",
            "size",
            "mtime",
            "createdAt",
            "reason",
            "sessionId",
            "checksum",
            "version",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_truncated_sidecar_is_skipped() {
        let (_temp, manager, mut session, file) = setup(10);
        let good = manager.create_backup(&mut session, &file, "one").unwrap();
        fs::write(&file, "const v = a.likes;\n").unwrap();
        let bad = manager.create_backup(&mut session, &file, "two").unwrap();

        let json = fs::read_to_string(&bad.sidecar).unwrap();
        fs::write(&bad.sidecar, &json[..json.len() / 2]).unwrap();

        let versions: Vec<u32> = manager
            .backups_for(&file)
            .unwrap()
            .iter()
            .map(|r| r.version())
            .collect();
        assert_eq!(versions, vec![good.version()]);

        let mut other = Session::new();
        let outcome = manager
            .restore_backup(&mut other, &file, VersionSelector::Latest)
            .unwrap();
        assert_eq!(outcome.restored.version(), good.version());
        assert_eq!(fs::read_to_string(&file).unwrap(), "const v = a.views;\n");

        // The damaged version number is never handed out again
        let next = manager.create_backup(&mut other, &file, "three").unwrap();
        assert!(next.version() > bad.version());
    }

    #[test]
    fn test_versions_increase_across_sessions() {
        let (_temp, manager, mut session, file) = setup(10);
        manager.create_backup(&mut session, &file, "one").unwrap();
        manager.create_backup(&mut session, &file, "two").unwrap();

        let mut other = Session::new();
        let record = manager.create_backup(&mut other, &file, "three").unwrap();
        assert_eq!(record.version(), 3);
    }

    #[test]
    fn test_pruning_keeps_newest_and_versions_are_not_reused() {
        let (_temp, manager, _session, file) = setup(2);
        for i in 0..4 {
            let mut session = Session::new();
            fs::write(&file, format!("v{i}")).unwrap();
            manager.create_backup(&mut session, &file, "edit").unwrap();
        }
        let versions: Vec<u32> = manager
            .backups_for(&file)
            .unwrap()
            .iter()
            .map(|r| r.version())
            .collect();
        assert_eq!(versions, vec![3, 4]);

        let mut session = Session::new();
        let next = manager.create_backup(&mut session, &file, "edit").unwrap();
        assert_eq!(next.version(), 5);
    }

    #[test]
    fn test_pruning_protects_session_anchor() {
        let (_temp, manager, mut session, file) = setup(1);
        let anchor = manager.create_backup(&mut session, &file, "first").unwrap();
        fs::write(&file, "changed").unwrap();
        manager.create_backup(&mut session, &file, "second").unwrap();

        fs::write(&file, "changed again").unwrap();
        let latest = manager.create_backup(&mut session, &file, "third").unwrap();

        assert!(anchor.artifact.is_file());
        assert!(latest.artifact.is_file());
        assert_eq!(session.anchor(&file).map(|r| r.version()), Some(1));
        let versions: Vec<u32> = manager
            .backups_for(&file)
            .unwrap()
            .iter()
            .map(|r| r.version())
            .collect();
        assert_eq!(versions, vec![1, 3]);
    }

    #[test]
    fn test_restore_round_trip_and_snapshot() {
        let (_temp, manager, mut session, file) = setup(10);
        let original = fs::read(&file).unwrap();
        manager.create_backup(&mut session, &file, "before").unwrap();
        fs::write(&file, "edited").unwrap();

        let outcome = manager
            .restore_backup(&mut session, &file, VersionSelector::Version(1))
            .unwrap();
        assert_eq!(fs::read(&file).unwrap(), original);
        let snapshot = outcome.snapshot.unwrap();
        assert_eq!(fs::read(&snapshot.artifact).unwrap(), b"edited");
        assert!(manager.verify_integrity(&outcome.restored).ok);
    }

    #[test]
    fn test_restore_refuses_tampered_backup() {
        let (_temp, manager, mut session, file) = setup(10);
        let record = manager.create_backup(&mut session, &file, "before").unwrap();
        fs::write(&record.artifact, "tampered").unwrap();
        fs::write(&file, "edited").unwrap();

        let result = manager.restore_backup(&mut session, &file, VersionSelector::Latest);
        assert!(matches!(result, Err(SafetyError::Integrity { .. })));
        assert_eq!(fs::read_to_string(&file).unwrap(), "edited");

        let report = manager.audit().unwrap();
        assert_eq!(report.len(), 1);
        assert!(!report[0].ok);
    }

    #[test]
    fn test_restore_without_backup() {
        let (_temp, manager, mut session, file) = setup(10);
        let result = manager.restore_backup(&mut session, &file, VersionSelector::Latest);
        assert!(matches!(result, Err(SafetyError::NoBackup { .. })));

        manager.create_backup(&mut session, &file, "x").unwrap();
        let result = manager.restore_backup(&mut session, &file, VersionSelector::Version(9));
        assert!(matches!(
            result,
            Err(SafetyError::VersionNotFound { version: 9, .. })
        ));
    }

    #[test]
    fn test_stats() {
        let (_temp, manager, mut session, file) = setup(10);
        manager.create_backup(&mut session, &file, "a").unwrap();
        manager.create_backup(&mut session, &file, "b").unwrap();
        let stats = manager.backup_stats().unwrap();
        assert_eq!(stats.total_backups, 2);
        assert_eq!(stats.per_file.len(), 1);
        assert_eq!(stats.oldest.unwrap().version, 1);
        assert_eq!(stats.newest.unwrap().version, 2);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(2048), "2.00 KB");
    }
}
