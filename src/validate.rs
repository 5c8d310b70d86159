//! Post-write verification.
//!
//! # Hard Rules (Never Violate)
//!
//! 1. **Write read-back**: the bytes on disk must hash to the bytes we meant
//!    to write.
//! 2. **Parse validation**: the converted file must not have more tree-sitter
//!    ERROR/MISSING nodes than the original. Pre-existing errors are tolerated.
//!
//! A size delta above the threshold is only a warning.

use crate::context::Language;
use crate::safety::sha256_hex;
use crate::syntax::{self, ErrorNode, SyntaxError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default relative size change above which a warning is raised.
pub const DEFAULT_SIZE_DELTA_THRESHOLD: f64 = 0.5;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Parse error introduced: found {count} new ERROR nodes")]
    ParseErrorIntroduced { count: usize, errors: Vec<ErrorNode> },

    #[error("Written content of {path} does not match: expected {expected}, found {actual}")]
    WriteMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Syntax check failed: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Cannot read back {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What post-write verification found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub checksum: String,
    pub syntax_checked: bool,
    pub size_before: usize,
    pub size_after: usize,
    pub size_delta: f64,
    pub warnings: Vec<String>,
}

/// Relative size change between two lengths.
pub fn size_delta(before: usize, after: usize) -> f64 {
    before.abs_diff(after) as f64 / before.max(1) as f64
}

/// Check that `edited` has no parse errors beyond those already in `original`.
pub fn validate_edit(
    language: Language,
    original: &str,
    edited: &str,
) -> Result<(), ValidationError> {
    syntax::with_parser(language, |parser| {
        let before = parser.parse_with_source(original)?.error_nodes();
        let after = parser.parse_with_source(edited)?.error_nodes();

        if after.len() > before.len() {
            let count = after.len() - before.len();
            return Err(ValidationError::ParseErrorIntroduced {
                count,
                errors: after,
            });
        }
        Ok(())
    })?
}

/// Verify a file that was just written with `expected`.
pub fn verify_written(
    path: &Path,
    original: &str,
    expected: &str,
    language: Language,
    size_delta_threshold: f64,
) -> Result<Verification, ValidationError> {
    let written = std::fs::read(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let checksum = sha256_hex(&written);
    let expected_checksum = sha256_hex(expected.as_bytes());
    if checksum != expected_checksum {
        return Err(ValidationError::WriteMismatch {
            path: path.to_path_buf(),
            expected: expected_checksum,
            actual: checksum,
        });
    }

    let syntax_checked = language.is_script();
    if syntax_checked {
        validate_edit(language, original, expected)?;
    }

    let delta = size_delta(original.len(), expected.len());
    let mut warnings = Vec::new();
    if delta > size_delta_threshold {
        tracing::warn!(
            path = %path.display(),
            before = original.len(),
            after = expected.len(),
            "file size changed by {:.0}%",
            delta * 100.0
        );
        warnings.push(format!(
            "file size changed by {:.0}% ({} -> {} bytes)",
            delta * 100.0,
            original.len(),
            expected.len()
        ));
    }

    Ok(Verification {
        checksum,
        syntax_checked,
        size_before: original.len(),
        size_after: expected.len(),
        size_delta: delta,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_edit_accepts_valid_conversion() {
        let original = "const v = a.views;";
        let edited = "const v = a[FieldMapper.get('VIEWS')];";
        assert!(validate_edit(Language::JavaScript, original, edited).is_ok());
    }

    #[test]
    fn test_validate_edit_rejects_new_errors() {
        let original = "const v = a.views;";
        let edited = "const v = a[FieldMapper.get('VIEWS');";
        let result = validate_edit(Language::JavaScript, original, edited);
        assert!(matches!(
            result,
            Err(ValidationError::ParseErrorIntroduced { .. })
        ));
    }

    #[test]
    fn test_validate_edit_tolerates_existing_errors() {
        let original = "const v = a.views;\nfunction (";
        let edited = "const v = a[FieldMapper.get('VIEWS')];\nfunction (";
        assert!(validate_edit(Language::JavaScript, original, edited).is_ok());
    }

    #[test]
    fn test_size_delta() {
        assert_eq!(size_delta(100, 150), 0.5);
        assert_eq!(size_delta(100, 40), 0.6);
        assert_eq!(size_delta(0, 10), 10.0);
    }

    #[test]
    fn test_verify_written_checks_disk_content() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.js");
        fs::write(&file, "const v = a[x];").unwrap();

        let ok = verify_written(&file, "const v = a.b;", "const v = a[x];", Language::JavaScript, 0.5)
            .unwrap();
        assert!(ok.syntax_checked);
        assert!(ok.warnings.is_empty());

        let mismatch = verify_written(&file, "", "something else", Language::JavaScript, 0.5);
        assert!(matches!(mismatch, Err(ValidationError::WriteMismatch { .. })));
    }

    #[test]
    fn test_verify_written_warns_on_large_delta() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("notes.txt");
        fs::write(&file, "aaaaaaaaaa").unwrap();

        let result = verify_written(&file, "aaaa", "aaaaaaaaaa", Language::Unknown, 0.5).unwrap();
        assert!(!result.syntax_checked);
        assert_eq!(result.warnings.len(), 1);
    }
}
