use crate::edit::Edit;
use crate::scanner::template::{PatternKind, Tier};
use serde::Serialize;

/// One located occurrence of a legacy field pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationSite {
    pub kind: PatternKind,
    /// Legacy field name the template was instantiated for
    pub field: String,
    /// Exact text of the span this site covers
    pub matched: String,
    /// Byte offset of `matched` in the source
    pub offset: usize,
    /// 1-based line of `offset`
    pub line: usize,
    pub tier: Tier,
    pub confidence: f64,
    /// Replacement for `matched`; `None` for ambiguous sites
    pub replacement: Option<String>,
}

impl ViolationSite {
    pub fn end(&self) -> usize {
        self.offset + self.matched.len()
    }

    pub fn is_auto(&self) -> bool {
        self.tier == Tier::Auto
    }

    /// Whether the two byte spans intersect.
    pub fn overlaps(&self, other: &ViolationSite) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// Whether `other` lies entirely inside this site's span.
    pub fn contains(&self, other: &ViolationSite) -> bool {
        self.offset <= other.offset && other.end() <= self.end()
    }

    /// The byte-span edit this site proposes, if it has a rewrite.
    pub fn to_edit(&self) -> Option<Edit> {
        self.replacement
            .as_ref()
            .map(|replacement| Edit::new(self.offset, self.end(), replacement.clone(), &self.matched))
    }
}
