//! Candidate file discovery for directory arguments.

use crate::safety::DEFAULT_BACKUP_DIR;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const DEFAULT_INCLUDE: &[&str] = &["**/*.{js,jsx,mjs,cjs,ts,tsx}"];

pub const DEFAULT_EXCLUDE: &[&str] = &[
    "**/node_modules/**",
    "**/dist/**",
    "**/.git/**",
];

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("invalid glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn build_set<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet, WalkError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = Glob::new(pattern).map_err(|source| WalkError::Glob {
            pattern: pattern.to_string(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| WalkError::Glob {
        pattern: "<set>".to_string(),
        source,
    })
}

/// Files under `root` matching `include` and not `exclude`, sorted.
///
/// Empty `include`/`exclude` fall back to the defaults; the default backup
/// directory is always excluded. A file `root` is returned as-is.
pub fn collect_files<S: AsRef<str>>(
    root: &Path,
    include: &[S],
    exclude: &[S],
    max_files: Option<usize>,
) -> Result<Vec<PathBuf>, WalkError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.exists() {
        return Err(WalkError::NotFound(root.to_path_buf()));
    }

    let include = if include.is_empty() {
        build_set(DEFAULT_INCLUDE)?
    } else {
        build_set(include)?
    };
    let mut exclude_patterns: Vec<String> = if exclude.is_empty() {
        DEFAULT_EXCLUDE.iter().map(|p| p.to_string()).collect()
    } else {
        exclude.iter().map(|p| p.as_ref().to_string()).collect()
    };
    exclude_patterns.push(format!("**/{DEFAULT_BACKUP_DIR}/**"));
    let exclude = build_set(&exclude_patterns)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| {
        let relative = e.path().strip_prefix(root).unwrap_or(e.path());
        // Match directories with a trailing component so `dir/**` excludes them
        e.depth() == 0 || !(exclude.is_match(relative) || exclude.is_match(relative.join("_")))
    }) {
        let entry = entry.map_err(|source| WalkError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if include.is_match(relative) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    if let Some(max) = max_files {
        if files.len() > max {
            tracing::warn!(found = files.len(), max, "truncating file list");
            files.truncate(max);
        }
    }
    tracing::debug!(root = %root.display(), files = files.len(), "collected files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const NONE: &[&str] = &[];

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_defaults_pick_scripts_and_skip_vendored() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "src/a.js");
        touch(root, "src/b.tsx");
        touch(root, "src/readme.md");
        touch(root, "node_modules/pkg/index.js");
        touch(root, "dist/bundle.js");
        touch(root, ".field-mapper-backups/a.js.1234abcd.v1.backup");

        let files = collect_files(root, NONE, NONE, None).unwrap();
        assert_eq!(files, vec![root.join("src/a.js"), root.join("src/b.tsx")]);
    }

    #[test]
    fn test_custom_globs_and_limit() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        touch(root, "a/one.js");
        touch(root, "a/two.js");
        touch(root, "b/three.js");

        let files = collect_files(root, &["**/*.js"], &["b/**"], Some(1)).unwrap();
        assert_eq!(files, vec![root.join("a/one.js")]);
    }

    #[test]
    fn test_single_file_is_returned_as_is() {
        let temp = tempfile::tempdir().unwrap();
        touch(temp.path(), "notes.txt");
        let file = temp.path().join("notes.txt");
        assert_eq!(collect_files(&file, NONE, NONE, None).unwrap(), vec![file]);
    }

    #[test]
    fn test_missing_root() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_files(&temp.path().join("nope"), NONE, NONE, None),
            Err(WalkError::NotFound(_))
        ));
    }
}
