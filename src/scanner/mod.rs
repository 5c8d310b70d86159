//! Lexical detection of legacy field references.
//!
//! The scanner is deliberately regex based: it never builds a syntax tree.
//! Auto-tier sites carry a deterministic replacement; ambiguous sites are
//! only located and left to the decision engine and a human reviewer.

pub mod site;
pub mod template;

pub use site::ViolationSite;
pub use template::{PatternKind, Tier};

use crate::edit::{self, EditError};
use crate::lines::LineIndex;
use crate::registry::FieldRegistry;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Minutes a developer spends fixing one site by hand.
pub const MANUAL_MINUTES_PER_SITE: f64 = 0.5;
/// Minutes the tool needs per auto-convertible site.
pub const TOOL_MINUTES_PER_AUTO_SITE: f64 = 0.01;
/// Minutes of review per ambiguous site.
pub const TOOL_MINUTES_PER_AMBIGUOUS_SITE: f64 = 0.1;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid detection template {kind} for field {field:?}: {source}")]
    Template {
        kind: PatternKind,
        field: String,
        #[source]
        source: regex::Error,
    },
}

struct CompiledTemplate {
    kind: PatternKind,
    field: String,
    regex: Regex,
}

/// Detector for every registered field and template.
pub struct PatternScanner {
    registry: FieldRegistry,
    templates: Vec<CompiledTemplate>,
}

/// Sites found in one source text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub auto_convertible: Vec<ViolationSite>,
    pub ambiguous: Vec<ViolationSite>,
    pub counts: BTreeMap<PatternKind, usize>,
}

impl ScanResult {
    pub fn total(&self) -> usize {
        self.auto_convertible.len() + self.ambiguous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All sites ordered by offset.
    pub fn sites(&self) -> Vec<&ViolationSite> {
        let mut sites: Vec<_> = self
            .auto_convertible
            .iter()
            .chain(self.ambiguous.iter())
            .collect();
        sites.sort_by_key(|s| (s.offset, s.kind));
        sites
    }

    pub fn stats(&self) -> ScanStats {
        let auto = self.auto_convertible.len();
        let ambiguous = self.ambiguous.len();
        ScanStats {
            total: self.total(),
            auto_convertible: auto,
            requires_review: ambiguous,
            pattern_breakdown: self.counts.clone(),
            manual_minutes: self.total() as f64 * MANUAL_MINUTES_PER_SITE,
            tool_minutes: auto as f64 * TOOL_MINUTES_PER_AUTO_SITE
                + ambiguous as f64 * TOOL_MINUTES_PER_AMBIGUOUS_SITE,
        }
    }
}

/// Effort estimate derived from a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStats {
    pub total: usize,
    pub auto_convertible: usize,
    pub requires_review: usize,
    pub pattern_breakdown: BTreeMap<PatternKind, usize>,
    pub manual_minutes: f64,
    pub tool_minutes: f64,
}

/// One rewrite performed by [`apply_auto_conversions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    pub line: usize,
    pub before: String,
    pub after: String,
    pub kind: PatternKind,
}

#[derive(Debug, Clone)]
pub struct AppliedConversions {
    pub converted: String,
    /// Changes in application (descending offset) order
    pub changes: Vec<AppliedChange>,
}

impl PatternScanner {
    /// Compile every template for every registered field.
    pub fn new(registry: FieldRegistry) -> Result<Self, ScanError> {
        let mut templates = Vec::with_capacity(registry.len() * PatternKind::ALL.len());
        for kind in PatternKind::ALL {
            for field in registry.legacy_names() {
                let regex = kind
                    .instantiate(field)
                    .map_err(|source| ScanError::Template {
                        kind,
                        field: field.to_string(),
                        source,
                    })?;
                templates.push(CompiledTemplate {
                    kind,
                    field: field.to_string(),
                    regex,
                });
            }
        }
        Ok(Self {
            registry,
            templates,
        })
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Find every site in `source`.
    pub fn scan(&self, source: &str) -> ScanResult {
        let lines = LineIndex::new(source);
        let mut auto = Vec::new();
        let mut ambiguous = Vec::new();

        for template in &self.templates {
            for caps in template.regex.captures_iter(source) {
                let Some(span) = caps.name("span").or_else(|| caps.get(0)) else {
                    continue;
                };
                let (start, end) = (span.start(), span.end());

                let accepted = match template.kind {
                    PatternKind::DirectAccess => {
                        !follows_spread(source, start) && member_access_ends(source, end)
                    }
                    PatternKind::LegacyFallback => fallback_ends(source, end),
                    _ => true,
                };
                if !accepted {
                    continue;
                }

                let matched = span.as_str().to_string();
                let site = ViolationSite {
                    kind: template.kind,
                    field: template.field.clone(),
                    replacement: self.replacement(template.kind, &template.field, &matched),
                    matched,
                    offset: start,
                    line: lines.line_of(start),
                    tier: template.kind.tier(),
                    confidence: template.kind.tier().confidence(),
                };

                match site.tier {
                    Tier::Auto => auto.push(site),
                    Tier::Ambiguous => ambiguous.push(site),
                }
            }
        }

        // A deleted fallback takes its member access with it
        let fallbacks: Vec<ViolationSite> = auto
            .iter()
            .filter(|s| s.kind == PatternKind::LegacyFallback)
            .cloned()
            .collect();
        auto.retain(|site| {
            site.kind == PatternKind::LegacyFallback
                || !fallbacks.iter().any(|fallback| fallback.contains(site))
        });

        auto.sort_by_key(|s| (s.offset, s.kind));
        ambiguous.sort_by_key(|s| (s.offset, s.kind));

        let mut counts = BTreeMap::new();
        for site in auto.iter().chain(ambiguous.iter()) {
            *counts.entry(site.kind).or_insert(0) += 1;
        }

        tracing::debug!(
            auto = auto.len(),
            ambiguous = ambiguous.len(),
            "scan complete"
        );

        ScanResult {
            auto_convertible: auto,
            ambiguous,
            counts,
        }
    }

    fn replacement(&self, kind: PatternKind, field: &str, matched: &str) -> Option<String> {
        let accessor = self.registry.accessor_for(field);
        match kind {
            PatternKind::DirectAccess if matched.starts_with("?.") => {
                Some(format!("?.[{accessor}]"))
            }
            PatternKind::DirectAccess | PatternKind::ObjectKey => Some(format!("[{accessor}]")),
            // Mixing old and new sources defeats the migration: always delete
            PatternKind::LegacyFallback => Some(String::new()),
            _ => None,
        }
    }
}

/// Splice the rewrites of `sites` into `source`, highest offset first.
///
/// Sites without a replacement are ignored. Overlapping spans are refused.
pub fn apply_auto_conversions<'a>(
    source: &str,
    sites: impl IntoIterator<Item = &'a ViolationSite>,
) -> Result<AppliedConversions, EditError> {
    let mut selected: Vec<&ViolationSite> =
        sites.into_iter().filter(|s| s.replacement.is_some()).collect();
    selected.sort_by(|a, b| b.offset.cmp(&a.offset));

    let edits = selected.iter().filter_map(|s| s.to_edit()).collect();
    let spliced = edit::splice(source, edits)?;

    let changes = selected
        .iter()
        .map(|s| AppliedChange {
            line: s.line,
            before: s.matched.clone(),
            after: s.replacement.clone().unwrap_or_default(),
            kind: s.kind,
        })
        .collect();

    Ok(AppliedConversions {
        converted: spliced.content,
        changes,
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `...name` is a spread of a variable, not member access.
fn follows_spread(source: &str, start: usize) -> bool {
    source[..start].ends_with('.')
}

/// Whether a `.field` access ending at `end` is a complete expression
/// rather than the head of a call, index or longer chain.
fn member_access_ends(source: &str, end: usize) -> bool {
    let rest = &source[end..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let mut chars = trimmed.chars();
    match chars.next() {
        None => true,
        // Statement end unless the next line continues the chain
        Some('\n' | '\r') => !continues_chain(trimmed.trim_start()),
        Some('?') => chars.next() != Some('.'),
        Some(c) => "=,])};|&:+-*/%<>!".contains(c),
    }
}

fn continues_chain(next_line: &str) -> bool {
    next_line.starts_with('.') || next_line.starts_with("?.") || next_line.starts_with('[')
}

/// A fallback can only be deleted if nothing further hangs off it.
fn fallback_ends(source: &str, end: usize) -> bool {
    let trimmed = source[end..].trim_start();
    match trimmed.chars().next() {
        None => true,
        Some(c) if is_ident_char(c) => false,
        Some('.' | '(' | '[' | '`') => false,
        Some('?') => !trimmed.starts_with("?."),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Accessor;

    fn scanner() -> PatternScanner {
        PatternScanner::new(FieldRegistry::from_pairs(
            [("legacyField", "CANON_KEY"), ("views", "VIEWS")],
            Accessor::new("lookup", "lookup"),
        ))
        .unwrap()
    }

    #[test]
    fn test_direct_access_assignment() {
        let result = scanner().scan("x.legacyField = 5;");
        assert_eq!(result.auto_convertible.len(), 1);
        let site = &result.auto_convertible[0];
        assert_eq!(site.kind, PatternKind::DirectAccess);
        assert_eq!(site.matched, ".legacyField");
        assert_eq!(site.offset, 1);
        assert_eq!(site.replacement.as_deref(), Some("[lookup('CANON_KEY')]"));
    }

    #[test]
    fn test_direct_access_rejects_calls_and_chains() {
        let s = scanner();
        assert!(s.scan("x.views();").auto_convertible.is_empty());
        assert!(s.scan("x.views[0];").auto_convertible.is_empty());
        assert!(s.scan("x.viewsCount = 1;").auto_convertible.is_empty());
        assert!(s.scan("const a = {...views};").auto_convertible.is_empty());
    }

    #[test]
    fn test_nested_access_is_ambiguous() {
        let result = scanner().scan("const t = a.views.total;");
        assert!(result.auto_convertible.is_empty());
        assert_eq!(result.ambiguous.len(), 1);
        assert_eq!(result.ambiguous[0].kind, PatternKind::NestedAccess);
        assert!(result.ambiguous[0].replacement.is_none());
    }

    #[test]
    fn test_multiline_chain_is_not_a_complete_access() {
        let s = scanner();
        assert!(s.scan("a.views\n  .map(f);").auto_convertible.is_empty());
        assert_eq!(s.scan("a.views\nfoo();").auto_convertible.len(), 1);
    }

    #[test]
    fn test_optional_chaining_replacement() {
        let result = scanner().scan("const v = a?.views;");
        assert_eq!(result.auto_convertible.len(), 1);
        assert_eq!(
            result.auto_convertible[0].replacement.as_deref(),
            Some("?.[lookup('VIEWS')]")
        );
    }

    #[test]
    fn test_object_key() {
        let result = scanner().scan("const o = { views: 1, legacyField: 2 };");
        let kinds: Vec<_> = result.auto_convertible.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![PatternKind::ObjectKey, PatternKind::ObjectKey]);
        assert_eq!(result.auto_convertible[0].matched, "views");
    }

    #[test]
    fn test_fallback_subsumes_member_access() {
        let source = "const v = a.legacyField || b.legacyField;";
        let result = scanner().scan(source);
        let kinds: Vec<_> = result.auto_convertible.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![PatternKind::DirectAccess, PatternKind::LegacyFallback]
        );

        let applied = apply_auto_conversions(source, &result.auto_convertible).unwrap();
        assert_eq!(applied.converted, "const v = a[lookup('CANON_KEY')];");
        assert_eq!(applied.changes.len(), 2);
    }

    #[test]
    fn test_dynamic_and_destructuring_are_ambiguous() {
        let result = scanner().scan("const { views, other } = data;\nconst w = data['views'];");
        let kinds: Vec<_> = result.ambiguous.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![PatternKind::Destructuring, PatternKind::DynamicAccess]
        );
        assert_eq!(result.ambiguous[1].line, 2);
    }

    #[test]
    fn test_counts_and_stats() {
        let result = scanner().scan("a.views = 1;\nb.views = 2;\nc.views.x = 3;");
        assert_eq!(result.counts.get(&PatternKind::DirectAccess), Some(&2));
        assert_eq!(result.counts.get(&PatternKind::NestedAccess), Some(&1));
        let stats = result.stats();
        assert_eq!(stats.total, 3);
        assert!((stats.manual_minutes - 1.5).abs() < 1e-9);
        assert!((stats.tool_minutes - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_converted_output_is_clean_on_rescan() {
        let s = scanner();
        let source = "x.legacyField = 5;\nconst o = { views: x.views };";
        let first = s.scan(source);
        let applied = apply_auto_conversions(source, &first.auto_convertible).unwrap();
        assert!(s.scan(&applied.converted).auto_convertible.is_empty());
    }
}
