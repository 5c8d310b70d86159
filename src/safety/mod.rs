//! SafetyManager: versioned, checksummed backups with restore and rollback.
//!
//! Every backup is an artifact (the original bytes) plus a JSON sidecar.
//! The sidecar is written last, so a backup without one never counts.
//! Sessions live in memory with the caller and can be rebuilt from the
//! sidecars on disk.

pub mod backup;
pub mod checksum;
pub mod preflight;
pub mod session;

pub use backup::{
    format_size, BackupMetadata, BackupRecord, BackupStats, FileBackupStats, IntegrityReport,
    RestoreOutcome, VersionSelector,
};
pub use checksum::sha256_hex;
pub use preflight::SafetyChecklist;
pub use session::{RollbackReport, Session};

use crate::edit::EditError;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default directory for backup artifacts, relative to the working directory.
pub const DEFAULT_BACKUP_DIR: &str = ".field-mapper-backups";
/// Default number of backups kept per file.
pub const DEFAULT_MAX_BACKUPS: usize = 10;

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Cannot read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Safety preflight failed for {path}: {}", failures.join(", "))]
    Preflight { path: PathBuf, failures: Vec<String> },

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("Integrity check failed for {path}: expected {expected}, found {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("No backup exists for {path}")]
    NoBackup { path: PathBuf },

    #[error("Backup version {version} not found for {path}")]
    VersionNotFound { path: PathBuf, version: u32 },

    #[error("max_backups must be at least 1")]
    InvalidRetention,

    #[error("Backup directory error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid backup metadata {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Owner of the on-disk backup directory.
#[derive(Debug, Clone)]
pub struct SafetyManager {
    dir: PathBuf,
    max_backups: usize,
}

impl SafetyManager {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Result<Self, SafetyError> {
        if max_backups == 0 {
            return Err(SafetyError::InvalidRetention);
        }
        Ok(Self {
            dir: dir.into(),
            max_backups,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    pub fn ensure_dir(&self) -> Result<(), SafetyError> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).map_err(|source| SafetyError::Io {
                path: self.dir.clone(),
                source,
            })?;
            tracing::info!(dir = %self.dir.display(), "created backup directory");
        }
        Ok(())
    }
}

/// Canonical form of a path used to key backups: absolute, symlinks
/// resolved where possible, forward slashes, lower-cased on Windows.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = path
        .canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf());
    let mut text = absolute.to_string_lossy().replace('\\', "/");
    if cfg!(windows) {
        text = text.to_lowercase();
    }
    PathBuf::from(text)
}
