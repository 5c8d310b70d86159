//! Parameterized detection templates.
//!
//! Each [`PatternKind`] owns one regex template with a `{field}` placeholder.
//! The scanner instantiates every template once per registered legacy name.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder substituted with the escaped legacy field name.
pub const FIELD_PLACEHOLDER: &str = "{field}";

/// Confidence class of a detection template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Deterministic rewrite with a fixed replacement
    Auto,
    /// Structural shape that needs a decision and has no automatic rewrite
    Ambiguous,
}

impl Tier {
    pub fn confidence(self) -> f64 {
        match self {
            Tier::Auto => 0.95,
            Tier::Ambiguous => 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    DirectAccess,
    ObjectKey,
    LegacyFallback,
    Destructuring,
    NestedAccess,
    DynamicAccess,
    FunctionParameter,
}

impl PatternKind {
    pub const ALL: [PatternKind; 7] = [
        PatternKind::DirectAccess,
        PatternKind::ObjectKey,
        PatternKind::LegacyFallback,
        PatternKind::Destructuring,
        PatternKind::NestedAccess,
        PatternKind::DynamicAccess,
        PatternKind::FunctionParameter,
    ];

    pub fn tier(self) -> Tier {
        match self {
            PatternKind::DirectAccess | PatternKind::ObjectKey | PatternKind::LegacyFallback => {
                Tier::Auto
            }
            _ => Tier::Ambiguous,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::DirectAccess => "direct_access",
            PatternKind::ObjectKey => "object_key",
            PatternKind::LegacyFallback => "legacy_fallback",
            PatternKind::Destructuring => "destructuring",
            PatternKind::NestedAccess => "nested_access",
            PatternKind::DynamicAccess => "dynamic_access",
            PatternKind::FunctionParameter => "function_parameter",
        }
    }

    /// Regex template. Auto-tier templates expose the rewritten span as the
    /// `span` group; ambiguous templates use the whole match.
    pub fn template(self) -> &'static str {
        match self {
            // `.field` / `?.field`; the follower is checked in code since the
            // regex crate has no lookahead
            PatternKind::DirectAccess => r"(?P<span>\??\.{field})\b",
            PatternKind::ObjectKey => r"[{,]\s*(?P<span>{field})\s*:",
            PatternKind::LegacyFallback => {
                r"(?P<span>\s*\|\|\s*[\w$]+(?:\??\.[\w$]+)*?\??\.{field})\b"
            }
            PatternKind::Destructuring => {
                r"\b(?:const|let|var)\s*\{[^}]*\b{field}\b[^}]*\}\s*="
            }
            PatternKind::NestedAccess => r"[\w$]+\??\.{field}\s*(?:\??\.[\w$]+|\[)",
            PatternKind::DynamicAccess => r#"\[\s*['"`]{field}['"`]\s*\]"#,
            PatternKind::FunctionParameter => r"\bfunction\b[^(]*\([^)]*\b{field}\b[^)]*\)",
        }
    }

    /// Instantiate the template for one legacy name.
    pub fn instantiate(self, field: &str) -> Result<Regex, regex::Error> {
        Regex::new(&instantiate(self.template(), field))
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substitute the escaped field name into a template.
pub fn instantiate(template: &str, field: &str) -> String {
    template.replace(FIELD_PLACEHOLDER, &regex::escape(field))
}
