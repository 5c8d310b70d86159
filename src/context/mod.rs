//! ContextClassifier: per-file and per-site structure and safety.
//!
//! A [`SourceIndex`] is built once per file from a single lexical pass.
//! Every site query afterwards is a lookup into that index.

pub mod file;
pub mod lexer;

pub use file::{
    CodeMetrics, FileContext, FileRecommendation, Language, RecommendationKind, RiskFactor,
    RiskKind, Severity,
};
pub use lexer::{BraceKind, Lexed, RegionKind};

use crate::lines::LineIndex;
use crate::registry::Accessor;
use file::FilePatterns;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Characters on each side of a site inspected for local nesting.
pub const LOCAL_WINDOW: usize = 200;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("cannot build import patterns for accessor {binding:?}: {source}")]
    ImportPattern {
        binding: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid context pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    VariableAssignment,
    ObjectLiteral,
    FunctionParameter,
    Destructuring,
    StringLiteral,
    Comment,
    RegexLiteral,
    CodeBlock,
    Unknown,
}

impl ContextType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextType::VariableAssignment => "variable_assignment",
            ContextType::ObjectLiteral => "object_literal",
            ContextType::FunctionParameter => "function_parameter",
            ContextType::Destructuring => "destructuring",
            ContextType::StringLiteral => "string_literal",
            ContextType::Comment => "comment",
            ContextType::RegexLiteral => "regex_literal",
            ContextType::CodeBlock => "code_block",
            ContextType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural context of one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteContext {
    pub context_type: ContextType,
    /// False inside strings, comments and regex literals. Overrides all scoring.
    pub is_safe_to_modify: bool,
    pub line: usize,
    pub line_text: String,
    /// Brace nesting reached within [`LOCAL_WINDOW`] of the site
    pub local_depth: usize,
}

/// Lexed view of one source text.
#[derive(Debug, Clone)]
pub struct SourceIndex<'a> {
    source: &'a str,
    lines: LineIndex,
    lexed: Lexed,
}

impl<'a> SourceIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            lines: LineIndex::new(source),
            lexed: lexer::lex(source),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn lexed(&self) -> &Lexed {
        &self.lexed
    }

    pub fn region_at(&self, offset: usize) -> RegionKind {
        self.lexed.kind_at(offset)
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.lines.line_of(offset)
    }

    pub fn line_text(&self, line: usize) -> &'a str {
        let (start, end) = self.lines.line_range(line);
        let source: &'a str = self.source;
        source.get(start..end).unwrap_or_default()
    }
}

/// Classifies files and sites. Holds the compiled patterns so one
/// classifier serves a whole batch.
#[derive(Debug, Clone)]
pub struct ContextClassifier {
    binding: String,
    file_patterns: FilePatterns,
    function_prefix: Regex,
    destructuring_line: Regex,
    assignment_line: Regex,
}

impl ContextClassifier {
    pub fn new(accessor: &Accessor) -> Result<Self, ContextError> {
        let binding = accessor.binding().to_string();
        let file_patterns = FilePatterns::new(&binding, &accessor.module).map_err(|source| {
            ContextError::ImportPattern {
                binding: binding.clone(),
                source,
            }
        })?;
        Ok(Self {
            binding,
            file_patterns,
            function_prefix: Regex::new(r"\bfunction\b\s*\*?\s*[\w$]*\s*\([^)]*$")?,
            destructuring_line: Regex::new(
                r"^\s*(?:export\s+)?(?:const|let|var)\s*[\{\[]",
            )?,
            // `const v =` declarations and `a.b.c =` / `a[k] +=` statements
            assignment_line: Regex::new(
                r"^\s*(?:(?:export\s+)?(?:const|let|var)\s+[\w$]+|[\w$]+(?:\??\.[\w$]+|\[[^\]]*\])*)\s*(?:[-+*/%]|\?\?|\|\||&&)?=[^=]",
            )?,
        })
    }

    /// Whole-file context: import, metrics, risk factors, safety score.
    pub fn analyze_file(&self, index: &SourceIndex<'_>, path: &Path) -> FileContext {
        let context = file::analyze(
            &self.file_patterns,
            index.source,
            &index.lexed,
            path,
            &self.binding,
        );
        tracing::debug!(
            path = %path.display(),
            safety_score = context.safety_score,
            risks = context.risk_factors.len(),
            import = context.has_accessor_import,
            "file context"
        );
        context
    }

    /// Context of the site starting at `offset`.
    pub fn analyze_position(&self, index: &SourceIndex<'_>, offset: usize) -> SiteContext {
        let line = index.line_of(offset);
        let line_text = index.line_text(line);
        let local_depth = index.lexed.local_depth(
            offset.saturating_sub(LOCAL_WINDOW),
            offset.saturating_add(LOCAL_WINDOW).min(index.source.len()),
        );

        let region = index.region_at(offset);
        let context_type = if offset > index.source.len() {
            ContextType::Unknown
        } else if region.is_string() {
            ContextType::StringLiteral
        } else if region.is_comment() {
            ContextType::Comment
        } else if region == RegionKind::Regex {
            ContextType::RegexLiteral
        } else {
            self.classify_code(index, offset, line)
        };

        SiteContext {
            context_type,
            is_safe_to_modify: region.is_code() && context_type != ContextType::Unknown,
            line,
            line_text: line_text.to_string(),
            local_depth,
        }
    }

    fn classify_code(&self, index: &SourceIndex<'_>, offset: usize, line: usize) -> ContextType {
        let (line_start, _) = index.lines.line_range(line);
        let line_text = index.line_text(line);
        let prefix = index.source.get(line_start..offset).unwrap_or_default();
        let enclosing = index.lexed.enclosing_brace(offset).map(|b| b.kind);

        if enclosing == Some(BraceKind::Pattern) || self.destructuring_line.is_match(line_text) {
            ContextType::Destructuring
        } else if self.function_prefix.is_match(prefix)
            || line_text
                .get(offset - line_start..)
                .is_some_and(|rest| rest.starts_with("function"))
        {
            ContextType::FunctionParameter
        } else if enclosing == Some(BraceKind::ObjectLiteral) {
            ContextType::ObjectLiteral
        } else if self.assignment_line.is_match(line_text) {
            ContextType::VariableAssignment
        } else {
            ContextType::CodeBlock
        }
    }
}
