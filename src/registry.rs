//! Legacy field name → canonical key table.
//!
//! The registry is read-only data for the scanner and the decision engine.
//! Insertion order is preserved so scans and reports are deterministic.

use serde::{Deserialize, Serialize};

/// Built-in table used when no configuration overrides `[fields]`.
const DEFAULT_FIELDS: &[(&str, &str)] = &[
    ("channelName", "CHANNEL_NAME"),
    ("subscribers", "SUBSCRIBERS"),
    ("views", "VIEWS"),
    ("likes", "LIKES"),
    ("videoTitle", "VIDEO_TITLE"),
    ("contentType", "CONTENT_TYPE"),
    ("platform", "PLATFORM"),
    ("videoUrl", "VIDEO_URL"),
    ("postUrl", "POST_URL"),
    ("analysisType", "ANALYSIS_TYPE"),
    ("useAI", "USE_AI"),
    ("metadata", "METADATA"),
    ("processing", "PROCESSING"),
    ("analysis", "ANALYSIS"),
    ("files", "FILES"),
    ("videoPath", "VIDEO_PATH"),
    ("thumbnailPath", "THUMBNAIL_PATH"),
    ("isProcessing", "IS_PROCESSING"),
    ("status", "STATUS"),
    ("row", "ROW"),
    ("column", "COLUMN"),
];

/// One legacy name and the key it migrates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub legacy: String,
    pub canonical: String,
}

impl FieldMapping {
    pub fn new(legacy: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            legacy: legacy.into(),
            canonical: canonical.into(),
        }
    }
}

/// The indirection accessor that replaces direct field access.
///
/// `expression` is called with the quoted canonical key, so the default
/// renders `FieldMapper.get('CHANNEL_NAME')`. `module` is the substring a
/// `require`/`import` specifier must contain for the import to count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accessor {
    pub expression: String,
    pub module: String,
}

impl Default for Accessor {
    fn default() -> Self {
        Self {
            expression: "FieldMapper.get".to_string(),
            module: "field-mapper".to_string(),
        }
    }
}

impl Accessor {
    pub fn new(expression: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            module: module.into(),
        }
    }

    /// Render the lookup call for a canonical key.
    pub fn render(&self, canonical: &str) -> String {
        format!("{}('{}')", self.expression, canonical)
    }

    /// Identifier the accessor is imported under (`FieldMapper` for
    /// `FieldMapper.get`, `lookup` for `lookup`).
    pub fn binding(&self) -> &str {
        self.expression
            .split('.')
            .next()
            .unwrap_or(self.expression.as_str())
    }
}

/// Ordered, closed set of legacy → canonical mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegistry {
    mappings: Vec<FieldMapping>,
    accessor: Accessor,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::with_accessor(Accessor::default())
    }
}

impl FieldRegistry {
    /// Build a registry. Later duplicates of a legacy name are ignored.
    pub fn new(mappings: impl IntoIterator<Item = FieldMapping>, accessor: Accessor) -> Self {
        let mut unique: Vec<FieldMapping> = Vec::new();
        for mapping in mappings {
            if !unique.iter().any(|m| m.legacy == mapping.legacy) {
                unique.push(mapping);
            }
        }
        Self {
            mappings: unique,
            accessor,
        }
    }

    /// The built-in field table rendered through `accessor`.
    pub fn with_accessor(accessor: Accessor) -> Self {
        Self::from_pairs(DEFAULT_FIELDS.iter().copied(), accessor)
    }

    /// Convenience constructor from `(legacy, canonical)` pairs.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        accessor: Accessor,
    ) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(legacy, canonical)| FieldMapping::new(legacy, canonical)),
            accessor,
        )
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn legacy_names(&self) -> impl Iterator<Item = &str> {
        self.mappings.iter().map(|m| m.legacy.as_str())
    }

    /// Canonical key for a legacy name; unknown names fall back to upper case.
    pub fn canonical_key(&self, legacy: &str) -> String {
        self.mappings
            .iter()
            .find(|m| m.legacy == legacy)
            .map(|m| m.canonical.clone())
            .unwrap_or_else(|| legacy.to_ascii_uppercase())
    }

    /// Rendered accessor expression for a legacy name.
    pub fn accessor_for(&self, legacy: &str) -> String {
        self.accessor.render(&self.canonical_key(legacy))
    }
}
