use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The rewrite primitive: byte-span replacement with before-text verification.
///
/// Every conversion the scanner proposes compiles down to an `Edit`. Edits
/// for one file are spliced together by [`splice`], which enforces the
/// descending-offset order and refuses overlapping spans.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until spliced"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Text that replaces [byte_start, byte_end)
    pub new_text: String,
    /// What we expect to find in the span before replacing it
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (used for spans over 1KB)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-text verification failed at byte {byte_start}: expected {expected}, found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in source of length {source_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        source_len: usize,
    },

    #[error("Overlapping edits: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one edit inside a splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditResult {
    /// The span was replaced
    Applied { byte_start: usize, bytes_changed: usize },
    /// The span already held `new_text`
    AlreadyApplied { byte_start: usize },
}

/// Output of [`splice`].
#[derive(Debug, Clone)]
pub struct Spliced {
    pub content: String,
    /// One entry per edit, in application (descending offset) order
    pub results: Vec<EditResult>,
}

impl Spliced {
    pub fn applied_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, EditResult::Applied { .. }))
            .count()
    }
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Create an edit with explicit verification strategy.
    pub fn with_verification(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        verification: EditVerification,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: verification,
        }
    }

    /// Validate the edit against the source, returning the current span text.
    fn validate<'a>(&self, source: &'a str) -> Result<&'a str, EditError> {
        let invalid = || EditError::InvalidByteRange {
            byte_start: self.byte_start,
            byte_end: self.byte_end,
            source_len: source.len(),
        };

        if self.byte_start > self.byte_end {
            return Err(invalid());
        }

        // `get` also rejects offsets that are not on a char boundary
        let current = source.get(self.byte_start..self.byte_end).ok_or_else(invalid)?;

        if current == self.new_text {
            return Ok(current);
        }

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }
}

/// Apply a set of edits to one source text.
///
/// Edits are sorted by `byte_start` descending and spliced bottom-to-top so
/// that earlier offsets stay valid after each replacement. All edits are
/// validated and checked for overlap before anything is spliced; a single
/// failure leaves the source untouched.
pub fn splice(source: &str, mut edits: Vec<Edit>) -> Result<Spliced, EditError> {
    edits.sort_by(|a, b| {
        b.byte_start
            .cmp(&a.byte_start)
            .then(b.byte_end.cmp(&a.byte_end))
    });

    for edit in &edits {
        edit.validate(source)?;
    }

    // Sorted descending: the earlier edit must end at or before the later one starts
    for window in edits.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.byte_end > later.byte_start {
            return Err(EditError::Overlap {
                first_start: earlier.byte_start,
                first_end: earlier.byte_end,
                second_start: later.byte_start,
                second_end: later.byte_end,
            });
        }
    }

    let mut content = source.to_string();
    let mut results = Vec::with_capacity(edits.len());

    for edit in &edits {
        if content[edit.byte_start..edit.byte_end] == edit.new_text {
            results.push(EditResult::AlreadyApplied {
                byte_start: edit.byte_start,
            });
            continue;
        }

        content.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
        results.push(EditResult::Applied {
            byte_start: edit.byte_start,
            bytes_changed: edit.new_text.len(),
        });
    }

    Ok(Spliced { content, results })
}

/// Write converted source back and bump its mtime.
pub fn write_source(path: &Path, content: &[u8]) -> Result<(), EditError> {
    atomic_write(path, content)?;
    filetime::set_file_mtime(path, filetime::FileTime::now())?;
    Ok(())
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or nothing changes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Tempfile must live in the same directory to stay on the same filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the original file's permissions on the replacement
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("hello world".to_string());
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
    }

    #[test]
    fn test_splice_invalid_range() {
        let edit = Edit::new(5, 20, "replacement", "");
        let result = splice("hello world", vec![edit]);
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_splice_inverted_range() {
        let edit = Edit::new(10, 5, "replacement", "");
        let result = splice("hello world", vec![edit]);
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_splice_rejects_non_char_boundary() {
        let edit = Edit::new(1, 2, "x", "");
        let result = splice("é", vec![edit]);
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_splice_before_text_mismatch() {
        let edit = Edit::new(0, 5, "HELLO", "world");
        let result = splice("hello world", vec![edit]);
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_splice_descending_order_keeps_offsets_valid() {
        let source = "line1\nline2\nline3\n";
        let edits = vec![
            Edit::new(0, 5, "FIRST LINE", "line1"),
            Edit::new(6, 11, "L2", "line2"),
            Edit::new(12, 17, "", "line3"),
        ];

        let spliced = splice(source, edits).unwrap();
        assert_eq!(spliced.content, "FIRST LINE\nL2\n\n");
        assert_eq!(spliced.applied_count(), 3);
        assert!(matches!(
            spliced.results[0],
            EditResult::Applied { byte_start: 12, .. }
        ));
    }

    #[test]
    fn test_splice_rejects_overlap() {
        let source = "abcdefghij";
        let edits = vec![Edit::new(0, 5, "X", "abcde"), Edit::new(3, 7, "Y", "defg")];
        let result = splice(source, edits);
        assert!(matches!(result, Err(EditError::Overlap { .. })));
    }

    #[test]
    fn test_splice_adjacent_edits_are_not_overlapping() {
        let edits = vec![Edit::new(0, 3, "X", "abc"), Edit::new(3, 6, "Y", "def")];
        let spliced = splice("abcdef", edits).unwrap();
        assert_eq!(spliced.content, "XY");
    }

    #[test]
    fn test_splice_idempotent_span() {
        let edit = Edit::new(0, 5, "hello", "hello");
        let spliced = splice("hello world", vec![edit]).unwrap();
        assert_eq!(spliced.content, "hello world");
        assert!(matches!(
            spliced.results[0],
            EditResult::AlreadyApplied { .. }
        ));
    }

    #[test]
    fn test_atomic_write_integration() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.js");
        fs::write(&file_path, b"original content").unwrap();

        write_source(&file_path, b"modified content").unwrap();

        let new_content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(new_content, "modified content");
    }
}
