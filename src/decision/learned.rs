//! Library of known-safe and known-risky line shapes.
//!
//! Patterns are templates with a `{field}` placeholder, instantiated for
//! every registered legacy name and matched against the site's line.

use crate::registry::FieldRegistry;
use crate::scanner::template::instantiate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::DecisionError;

/// Score when no learned pattern matches.
pub const NEUTRAL_PATTERN_SCORE: f64 = 0.5;
/// Upper bound of the pattern score once a risky pattern matched.
pub const RISKY_PATTERN_CAP: f64 = 0.10;

/// One learned pattern as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub pattern: String,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

impl LearnedPattern {
    pub fn new(pattern: impl Into<String>, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            confidence,
            reason: reason.into(),
        }
    }
}

pub fn default_safe_patterns() -> Vec<LearnedPattern> {
    vec![
        LearnedPattern::new(
            r"^\s*(?:const|let|var)\s+[\w$]+\s*=\s*[\w$]+(?:\??\.[\w$]+)*?\??\.{field}\b",
            0.95,
            "simple variable read",
        ),
        LearnedPattern::new(
            r"\breturn\s+\{[^}]*\b{field}\s*:",
            0.90,
            "object returned from a function",
        ),
        LearnedPattern::new(
            r"^\s*[\w$]+(?:\.[\w$]+)*\.{field}\s*=[^=]",
            0.90,
            "plain member assignment",
        ),
    ]
}

pub fn default_risky_patterns() -> Vec<LearnedPattern> {
    vec![
        LearnedPattern::new(
            r"\beval\([^)]*{field}",
            0.05,
            "field inside eval() is executed dynamically",
        ),
        LearnedPattern::new(
            r#"['"`][^'"`]*\b{field}\b[^'"`]*['"`]"#,
            0.10,
            "field name also appears inside a string",
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Safe,
    Risky,
    None,
}

/// Outcome of matching a line against the library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternJudgment {
    pub kind: MatchKind,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    confidence: f64,
    reason: String,
    by_field: HashMap<String, Regex>,
}

impl CompiledPattern {
    fn compile(pattern: &LearnedPattern, registry: &FieldRegistry) -> Result<Self, DecisionError> {
        let mut by_field = HashMap::with_capacity(registry.len());
        for field in registry.legacy_names() {
            let regex = Regex::new(&instantiate(&pattern.pattern, field)).map_err(|source| {
                DecisionError::LearnedPattern {
                    pattern: pattern.pattern.clone(),
                    field: field.to_string(),
                    source,
                }
            })?;
            by_field.insert(field.to_string(), regex);
        }
        Ok(Self {
            confidence: pattern.confidence,
            reason: pattern.reason.clone(),
            by_field,
        })
    }

    fn matches(&self, field: &str, line: &str) -> bool {
        self.by_field.get(field).is_some_and(|re| re.is_match(line))
    }
}

#[derive(Debug, Clone)]
pub struct LearnedLibrary {
    safe: Vec<CompiledPattern>,
    risky: Vec<CompiledPattern>,
}

impl LearnedLibrary {
    pub fn new(
        safe: &[LearnedPattern],
        risky: &[LearnedPattern],
        registry: &FieldRegistry,
    ) -> Result<Self, DecisionError> {
        Ok(Self {
            safe: safe
                .iter()
                .map(|p| CompiledPattern::compile(p, registry))
                .collect::<Result<_, _>>()?,
            risky: risky
                .iter()
                .map(|p| CompiledPattern::compile(p, registry))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn with_defaults(registry: &FieldRegistry) -> Result<Self, DecisionError> {
        Self::new(&default_safe_patterns(), &default_risky_patterns(), registry)
    }

    /// Judge one line. A risky match wins over any safe match; the best
    /// safe match wins otherwise.
    pub fn judge(&self, field: &str, line: &str) -> PatternJudgment {
        if let Some(risky) = self.risky.iter().find(|p| p.matches(field, line)) {
            return PatternJudgment {
                kind: MatchKind::Risky,
                score: risky.confidence.min(RISKY_PATTERN_CAP),
                reason: risky.reason.clone(),
            };
        }

        let best = self
            .safe
            .iter()
            .filter(|p| p.matches(field, line))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        match best {
            Some(safe) => PatternJudgment {
                kind: MatchKind::Safe,
                score: safe.confidence,
                reason: safe.reason.clone(),
            },
            None => PatternJudgment {
                kind: MatchKind::None,
                score: NEUTRAL_PATTERN_SCORE,
                reason: "no learned pattern matched".to_string(),
            },
        }
    }
}
