use super::backup::{BackupRecord, RestoreOutcome};
use super::{normalize_path, SafetyError, SafetyManager};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Backups taken during one orchestrator run, keyed by normalised path.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    backups: BTreeMap<PathBuf, Vec<BackupRecord>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::with_id(format!("session-{timestamp}-{}", &suffix[..8]))
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backups: BTreeMap::new(),
        }
    }

    /// Rebuild a past session from the sidecars on disk.
    pub fn load(manager: &SafetyManager, id: &str) -> Result<Self, SafetyError> {
        let mut session = Self::with_id(id);
        for record in manager.all_backups()? {
            if record.metadata.session_id == id {
                session.record(record);
            }
        }
        for records in session.backups.values_mut() {
            records.sort_by_key(|r| r.metadata.version);
        }
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.backups.keys().map(PathBuf::as_path)
    }

    pub fn backup_count(&self) -> usize {
        self.backups.values().map(Vec::len).sum()
    }

    pub(crate) fn record(&mut self, record: BackupRecord) {
        self.backups
            .entry(record.metadata.original_path.clone())
            .or_default()
            .push(record);
    }

    pub(crate) fn forget(&mut self, artifact: &Path) {
        for records in self.backups.values_mut() {
            records.retain(|r| r.artifact != artifact);
        }
        self.backups.retain(|_, records| !records.is_empty());
    }

    pub fn backups_for(&self, path: &Path) -> &[BackupRecord] {
        self.backups
            .get(&normalize_path(path))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Earliest backup of `path` in this session: its pre-session content.
    pub fn anchor(&self, path: &Path) -> Option<&BackupRecord> {
        self.backups_for(path).first()
    }

    /// Highest backup version of `path` recorded in this session, 0 if none.
    pub fn latest_version(&self, path: &Path) -> u32 {
        self.backups_for(path)
            .iter()
            .map(|r| r.metadata.version)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RolledBackFile {
    pub path: PathBuf,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregated result of a best-effort session rollback.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub session_id: String,
    pub restored: Vec<RolledBackFile>,
    pub failed: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl SafetyManager {
    /// Restore one file to its first backup in `session` with a version
    /// above `since`. `since = 0` restores the anchor. `None` if there is
    /// no such backup.
    pub fn rollback_file(
        &self,
        session: &mut Session,
        path: &Path,
        since: u32,
    ) -> Result<Option<RestoreOutcome>, SafetyError> {
        let Some(target) = session
            .backups_for(path)
            .iter()
            .find(|r| r.metadata.version > since)
            .cloned()
        else {
            return Ok(None);
        };
        tracing::warn!(
            path = %path.display(),
            version = target.metadata.version,
            "rolling back file"
        );
        self.restore_record(session, path, &target).map(Some)
    }

    /// Restore every file touched by `session` to its pre-session content.
    ///
    /// One file failing does not stop the others.
    pub fn rollback_session(&self, session: &mut Session) -> RollbackReport {
        let mut report = RollbackReport {
            session_id: session.id().to_string(),
            ..Default::default()
        };

        let anchors: Vec<BackupRecord> = session
            .backups
            .values()
            .filter_map(|records| records.first().cloned())
            .collect();

        for anchor in anchors {
            let path = anchor.metadata.original_path.clone();
            match self.restore_record(session, &path, &anchor) {
                Ok(_) => report.restored.push(RolledBackFile {
                    path,
                    version: anchor.metadata.version,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "rollback failed");
                    report.failed.push(RollbackFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            session = %report.session_id,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "session rollback finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_session_id_shape() {
        let session = Session::new();
        assert!(session.id().starts_with("session-"));
        assert!(session.is_empty());
        assert_ne!(session.id(), Session::new().id());
    }

    #[test]
    fn test_rollback_restores_every_file_to_anchor() {
        let temp = TempDir::new().unwrap();
        let manager = SafetyManager::new(temp.path().join("backups"), 10).unwrap();
        let a = temp.path().join("a.js");
        let b = temp.path().join("b.js");
        fs::write(&a, "a0").unwrap();
        fs::write(&b, "b0").unwrap();

        let mut session = Session::new();
        manager.create_backup(&mut session, &a, "edit").unwrap();
        fs::write(&a, "a1").unwrap();
        manager.create_backup(&mut session, &a, "edit").unwrap();
        fs::write(&a, "a2").unwrap();
        manager.create_backup(&mut session, &b, "edit").unwrap();
        fs::write(&b, "b1").unwrap();

        let report = manager.rollback_session(&mut session);
        assert!(report.is_complete());
        assert_eq!(report.restored.len(), 2);
        assert_eq!(fs::read_to_string(&a).unwrap(), "a0");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b0");
    }

    #[test]
    fn test_rollback_is_best_effort() {
        let temp = TempDir::new().unwrap();
        let manager = SafetyManager::new(temp.path().join("backups"), 10).unwrap();
        let a = temp.path().join("a.js");
        let b = temp.path().join("b.js");
        fs::write(&a, "a0").unwrap();
        fs::write(&b, "b0").unwrap();

        let mut session = Session::new();
        let broken = manager.create_backup(&mut session, &a, "edit").unwrap();
        manager.create_backup(&mut session, &b, "edit").unwrap();
        fs::write(&broken.artifact, "corrupt").unwrap();
        fs::write(&a, "a1").unwrap();
        fs::write(&b, "b1").unwrap();

        let report = manager.rollback_session(&mut session);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.restored.len(), 1);
        assert_eq!(fs::read_to_string(&a).unwrap(), "a1");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b0");
    }

    #[test]
    fn test_load_session_from_disk() {
        let temp = TempDir::new().unwrap();
        let manager = SafetyManager::new(temp.path().join("backups"), 10).unwrap();
        let a = temp.path().join("a.js");
        fs::write(&a, "a0").unwrap();

        let mut session = Session::new();
        manager.create_backup(&mut session, &a, "edit").unwrap();
        fs::write(&a, "a1").unwrap();

        let mut loaded = Session::load(&manager, session.id()).unwrap();
        assert_eq!(loaded.backup_count(), 1);
        let report = manager.rollback_session(&mut loaded);
        assert!(report.is_complete());
        assert_eq!(fs::read_to_string(&a).unwrap(), "a0");
    }
}
