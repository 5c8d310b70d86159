//! Whole-file context: accessor import, structural metrics, risk factors.

use super::lexer::Lexed;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Lines above which a file counts as large.
pub const LARGE_FILE_LINES: usize = 1000;
/// Brace nesting above which a file counts as deeply nested.
pub const MAX_SAFE_NESTING: usize = 5;
/// Regex literal count above which a file is flagged.
pub const MANY_REGEX_LITERALS: usize = 10;
/// Cyclomatic complexity above which the safety score drops.
pub const HIGH_COMPLEXITY: usize = 20;
/// Safety score below which a manual review is recommended.
pub const LOW_SAFETY_SCORE: u32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js" | "mjs" | "cjs") => Language::JavaScript,
            Some("jsx") => Language::Jsx,
            Some("ts" | "mts" | "cts") => Language::TypeScript,
            Some("tsx") => Language::Tsx,
            _ => Language::Unknown,
        }
    }

    pub fn is_script(self) -> bool {
        self != Language::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Safety score penalty for one risk factor of this severity.
    pub fn penalty(self) -> u32 {
        match self {
            Severity::High => 25,
            Severity::Medium => 15,
            Severity::Low => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    EvalUsage,
    FunctionConstructor,
    HighNesting,
    LargeFile,
    ManyRegex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFactor {
    pub kind: RiskKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    MissingImport,
    LowSafetyScore,
    LargeFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecommendation {
    pub kind: RecommendationKind,
    pub priority: Severity,
    pub message: String,
    pub solution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeMetrics {
    pub total_lines: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub functions: usize,
    pub classes: usize,
    pub exports: usize,
    /// Approximate cyclomatic complexity: 1 + branch and logical operators
    pub complexity: usize,
    pub max_depth: usize,
    pub regex_literals: usize,
}

/// Per-file context, computed once per conversion.
#[derive(Debug, Clone, Serialize)]
pub struct FileContext {
    pub path: PathBuf,
    pub language: Language,
    pub has_accessor_import: bool,
    pub metrics: CodeMetrics,
    pub risk_factors: Vec<RiskFactor>,
    /// 0–100, higher is safer
    pub safety_score: u32,
    pub recommendations: Vec<FileRecommendation>,
}

impl FileContext {
    pub fn is_large(&self) -> bool {
        self.metrics.total_lines > LARGE_FILE_LINES
    }
}

/// Regexes shared by every file analysis.
#[derive(Debug, Clone)]
pub(super) struct FilePatterns {
    pub imports: Vec<Regex>,
    pub complexity: Vec<Regex>,
    pub functions: Vec<Regex>,
    pub classes: Regex,
    pub exports: Regex,
    pub eval: Regex,
    pub function_constructor: Regex,
}

impl FilePatterns {
    pub fn new(binding: &str, module: &str) -> Result<Self, regex::Error> {
        let binding = regex::escape(binding);
        let module = regex::escape(module);
        let specifier = format!(r#"['"`][^'"`]*{module}[^'"`]*['"`]"#);

        let imports = [
            format!(r"\b(?:const|let|var)\s+{binding}\s*=\s*require\s*\(\s*{specifier}\s*\)"),
            format!(r"\b(?:const|let|var)\s*\{{[^}}]*\b{binding}\b[^}}]*\}}\s*=\s*require\s*\(\s*{specifier}\s*\)"),
            format!(r"\bimport\s+{binding}\s+from\s+{specifier}"),
            format!(r"\bimport\s*\{{[^}}]*\b{binding}\b[^}}]*\}}\s*from\s+{specifier}"),
            format!(r"\bimport\s+\*\s+as\s+{binding}\s+from\s+{specifier}"),
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<_, _>>()?;

        let complexity = [
            r"\bif\s*\(",
            r"\belse\b",
            r"\bfor\s*\(",
            r"\bwhile\s*\(",
            r"\bswitch\s*\(",
            r"\bcase\s+",
            r"\bcatch\s*\(",
            r"&&|\|\|",
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<Result<_, _>>()?;

        let functions = [r"\bfunction\s+[\w$]+", r"=\s*(?:async\s*)?\([^)]*\)\s*=>"]
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            imports,
            complexity,
            functions,
            classes: Regex::new(r"\bclass\s+[\w$]+")?,
            exports: Regex::new(r"\bmodule\.exports\b|\bexport\s")?,
            eval: Regex::new(r"\beval\s*\(")?,
            function_constructor: Regex::new(r"\bnew\s+Function\s*\(")?,
        })
    }
}

pub(super) fn analyze(
    patterns: &FilePatterns,
    source: &str,
    lexed: &Lexed,
    path: &Path,
    binding: &str,
) -> FileContext {
    let code = lexed.code_view(source);

    let metrics = metrics(patterns, source, &code, lexed);
    let has_accessor_import = patterns.imports.iter().any(|re| {
        re.find_iter(source)
            .any(|m| lexed.kind_at(m.start()).is_code())
    });
    let risk_factors = risk_factors(patterns, &code, &metrics);

    let mut safety_score: u32 = 100;
    if !has_accessor_import {
        safety_score = safety_score.saturating_sub(30);
    }
    for risk in &risk_factors {
        safety_score = safety_score.saturating_sub(risk.severity.penalty());
    }
    if metrics.complexity > HIGH_COMPLEXITY {
        safety_score = safety_score.saturating_sub(10);
    }

    let mut recommendations = Vec::new();
    if !has_accessor_import {
        recommendations.push(FileRecommendation {
            kind: RecommendationKind::MissingImport,
            priority: Severity::High,
            message: format!("{binding} is not imported"),
            solution: format!("add an import of {binding} before using converted accessors"),
        });
    }
    if safety_score < LOW_SAFETY_SCORE {
        recommendations.push(FileRecommendation {
            kind: RecommendationKind::LowSafetyScore,
            priority: Severity::Medium,
            message: format!("safety score {safety_score} is low; review changes by hand"),
            solution: "remove the flagged risk factors or convert in smaller steps".to_string(),
        });
    }
    if metrics.total_lines > LARGE_FILE_LINES {
        recommendations.push(FileRecommendation {
            kind: RecommendationKind::LargeFile,
            priority: Severity::Medium,
            message: format!("large file ({} lines)", metrics.total_lines),
            solution: "split the file or convert it section by section".to_string(),
        });
    }

    FileContext {
        path: path.to_path_buf(),
        language: Language::from_path(path),
        has_accessor_import,
        metrics,
        risk_factors,
        safety_score,
        recommendations,
    }
}

fn metrics(patterns: &FilePatterns, source: &str, code: &str, lexed: &Lexed) -> CodeMetrics {
    let total_lines = source.split('\n').count();

    // A line is code if anything but whitespace survives blanking
    let code_lines = code.lines().filter(|l| !l.trim().is_empty()).count();
    let comment_lines = source
        .lines()
        .zip(code.lines())
        .filter(|(original, blanked)| blanked.trim().is_empty() && !original.trim().is_empty())
        .count();

    let complexity = 1 + patterns
        .complexity
        .iter()
        .map(|re| re.find_iter(code).count())
        .sum::<usize>();

    CodeMetrics {
        total_lines,
        code_lines,
        comment_lines,
        functions: patterns
            .functions
            .iter()
            .map(|re| re.find_iter(code).count())
            .sum(),
        classes: patterns.classes.find_iter(code).count(),
        exports: patterns.exports.find_iter(code).count(),
        complexity,
        max_depth: lexed.max_depth,
        regex_literals: lexed.regex_literals,
    }
}

fn risk_factors(patterns: &FilePatterns, code: &str, metrics: &CodeMetrics) -> Vec<RiskFactor> {
    let mut risks = Vec::new();

    if patterns.eval.is_match(code) {
        risks.push(RiskFactor {
            kind: RiskKind::EvalUsage,
            severity: Severity::High,
            message: "eval() executes dynamic code".to_string(),
        });
    }
    if patterns.function_constructor.is_match(code) {
        risks.push(RiskFactor {
            kind: RiskKind::FunctionConstructor,
            severity: Severity::High,
            message: "Function constructor executes dynamic code".to_string(),
        });
    }
    if metrics.max_depth > MAX_SAFE_NESTING {
        risks.push(RiskFactor {
            kind: RiskKind::HighNesting,
            severity: Severity::Medium,
            message: format!("deep nesting (depth {})", metrics.max_depth),
        });
    }
    if metrics.total_lines > LARGE_FILE_LINES {
        risks.push(RiskFactor {
            kind: RiskKind::LargeFile,
            severity: Severity::Medium,
            message: format!("large file ({} lines)", metrics.total_lines),
        });
    }
    if metrics.regex_literals > MANY_REGEX_LITERALS {
        risks.push(RiskFactor {
            kind: RiskKind::ManyRegex,
            severity: Severity::Low,
            message: format!("{} regex literals", metrics.regex_literals),
        });
    }

    risks
}
