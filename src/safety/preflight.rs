use super::{SafetyError, SafetyManager};
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;

/// Checks run before a file is backed up or edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyChecklist {
    pub file_exists: bool,
    pub readable: bool,
    pub writable: bool,
    /// `None` when the backup directory was not checked (dry runs)
    pub backup_dir_writable: Option<bool>,
    pub has_backup: bool,
}

impl SafetyChecklist {
    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if !self.file_exists {
            failures.push("file does not exist".to_string());
        }
        if self.file_exists && !self.readable {
            failures.push("file is not readable".to_string());
        }
        if self.file_exists && !self.writable {
            failures.push("file is not writable".to_string());
        }
        if self.backup_dir_writable == Some(false) {
            failures.push("backup directory is not writable".to_string());
        }
        failures
    }

    pub fn passed(&self) -> bool {
        self.failures().is_empty()
    }

    /// Turn a failed checklist into an error.
    pub fn ensure(&self, path: &Path) -> Result<(), SafetyError> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SafetyError::Preflight {
                path: path.to_path_buf(),
                failures,
            })
        }
    }
}

impl SafetyManager {
    /// Run the checklist for `path`. Nothing is modified except that the
    /// backup directory is created when it is checked and missing.
    pub fn run_preflight(&self, path: &Path, check_backup_dir: bool) -> SafetyChecklist {
        let metadata = fs::metadata(path).ok();
        let file_exists = metadata.as_ref().is_some_and(|m| m.is_file());
        let readable = file_exists && File::open(path).is_ok();
        let writable = metadata
            .as_ref()
            .is_some_and(|m| m.is_file() && !m.permissions().readonly());

        let backup_dir_writable = check_backup_dir.then(|| {
            self.ensure_dir().is_ok() && tempfile::tempfile_in(self.dir()).is_ok()
        });

        let has_backup = file_exists
            && self
                .backups_for(path)
                .map(|records| !records.is_empty())
                .unwrap_or(false);

        let checklist = SafetyChecklist {
            file_exists,
            readable,
            writable,
            backup_dir_writable,
            has_backup,
        };
        tracing::debug!(path = %path.display(), ?checklist, "safety preflight");
        checklist
    }
}
