//! DecisionEngine: weighted scoring of sites into approve / review / reject.
//!
//! The score is a fixed linear combination of four components. Weights and
//! thresholds are named constants so each part can be tested on its own.

pub mod learned;

pub use learned::{LearnedLibrary, LearnedPattern, MatchKind, PatternJudgment};

use crate::context::{ContextType, FileContext, SiteContext};
use crate::scanner::ViolationSite;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const WEIGHT_CONTEXT: f64 = 0.4;
pub const WEIGHT_PATTERN: f64 = 0.3;
pub const WEIGHT_COMPLEXITY: f64 = 0.2;
pub const WEIGHT_RISK: f64 = 0.1;

pub const APPROVE_THRESHOLD: f64 = 0.85;
pub const REVIEW_THRESHOLD: f64 = 0.60;

/// Local brace depth above which the complexity score drops.
pub const DEEP_LOCAL_NESTING: usize = 4;

#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("invalid learned pattern {pattern:?} for field {field:?}: {source}")]
    LearnedPattern {
        pattern: String,
        field: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Approve,
    Review,
    Reject,
}

impl Action {
    /// Map a weighted total onto the three bands.
    pub fn from_score(score: f64) -> Self {
        if score >= APPROVE_THRESHOLD {
            Action::Approve
        } else if score >= REVIEW_THRESHOLD {
            Action::Review
        } else {
            Action::Reject
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Approve => "approve",
            Action::Review => "review",
            Action::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub context: f64,
    pub pattern: f64,
    pub complexity: f64,
    pub risk: f64,
}

impl ComponentScores {
    pub fn total(&self) -> f64 {
        self.context * WEIGHT_CONTEXT
            + self.pattern * WEIGHT_PATTERN
            + self.complexity * WEIGHT_COMPLEXITY
            + self.risk * WEIGHT_RISK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Weighted total in [0, 1]
    pub confidence: f64,
    pub reason: String,
    pub scores: ComponentScores,
    pub pattern: PatternJudgment,
}

/// A site together with its context and the decision taken on it.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewedSite {
    pub site: ViolationSite,
    pub context: SiteContext,
    pub decision: Decision,
}

/// Context-safety score per context type.
pub fn context_score(context: ContextType) -> f64 {
    match context {
        ContextType::VariableAssignment => 0.85,
        ContextType::ObjectLiteral => 0.88,
        ContextType::FunctionParameter => 0.65,
        ContextType::Destructuring => 0.60,
        ContextType::StringLiteral => 0.10,
        ContextType::Comment => 0.05,
        ContextType::RegexLiteral => 0.05,
        ContextType::CodeBlock | ContextType::Unknown => 0.5,
    }
}

/// Complexity score from file complexity and local nesting.
pub fn complexity_score(file_complexity: usize, local_depth: usize) -> f64 {
    let mut score: f64 = 1.0;
    if file_complexity > 20 {
        score -= 0.3;
    } else if file_complexity > 10 {
        score -= 0.15;
    }
    if local_depth > DEEP_LOCAL_NESTING {
        score -= 0.2;
    }
    score.max(0.0)
}

/// Risk score from the file context.
pub fn risk_score(file: &FileContext) -> f64 {
    let mut score: f64 = 1.0;
    if file.is_large() {
        score -= 0.1;
    }
    if file.safety_score < crate::context::file::LOW_SAFETY_SCORE {
        score -= 0.2;
    }
    score -= 0.15 * file.risk_factors.len() as f64;
    if !file.has_accessor_import {
        score -= 0.25;
    }
    score.max(0.0)
}

pub struct DecisionEngine {
    library: LearnedLibrary,
}

impl DecisionEngine {
    pub fn new(library: LearnedLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &LearnedLibrary {
        &self.library
    }

    pub fn make_decision(
        &self,
        site: &ViolationSite,
        context: &SiteContext,
        file: &FileContext,
    ) -> Decision {
        let pattern = self.library.judge(&site.field, &context.line_text);
        let scores = ComponentScores {
            context: context_score(context.context_type),
            pattern: pattern.score,
            complexity: complexity_score(file.metrics.complexity, context.local_depth),
            risk: risk_score(file),
        };
        let confidence = scores.total().clamp(0.0, 1.0);

        // Strings, comments and regex literals are never rewritten
        let (action, reason) = if !context.is_safe_to_modify {
            (
                Action::Reject,
                format!("inside {}; never modified", context.context_type),
            )
        } else {
            let action = Action::from_score(confidence);
            let reason = match action {
                Action::Approve => "high confidence; convert automatically".to_string(),
                Action::Review => format!("needs manual review ({})", pattern.reason),
                Action::Reject => format!("too risky to convert ({})", pattern.reason),
            };
            (action, reason)
        };

        Decision {
            action,
            confidence,
            reason,
            scores,
            pattern,
        }
    }

    /// Decide every site and bucket the results.
    pub fn review_violations(
        &self,
        sites: impl IntoIterator<Item = (ViolationSite, SiteContext)>,
        file: &FileContext,
    ) -> Review {
        let mut review = Review::default();
        for (site, context) in sites {
            let decision = self.make_decision(&site, &context, file);
            tracing::debug!(
                field = %site.field,
                kind = %site.kind,
                line = site.line,
                action = %decision.action,
                confidence = decision.confidence,
                "decision"
            );
            let reviewed = ReviewedSite {
                site,
                context,
                decision,
            };
            match reviewed.decision.action {
                Action::Approve => review.approved.push(reviewed),
                Action::Review => review.needs_review.push(reviewed),
                Action::Reject => review.rejected.push(reviewed),
            }
        }
        review
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    SafeToProceed,
    NeedsCarefulReview,
    HighRisk,
    NothingToDo,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::SafeToProceed => "safe_to_proceed",
            Recommendation::NeedsCarefulReview => "needs_careful_review",
            Recommendation::HighRisk => "high_risk",
            Recommendation::NothingToDo => "nothing_to_do",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decisions for one file, bucketed by action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Review {
    pub approved: Vec<ReviewedSite>,
    pub needs_review: Vec<ReviewedSite>,
    pub rejected: Vec<ReviewedSite>,
}

impl Review {
    pub fn total(&self) -> usize {
        self.approved.len() + self.needs_review.len() + self.rejected.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &ReviewedSite> {
        self.approved
            .iter()
            .chain(self.needs_review.iter())
            .chain(self.rejected.iter())
    }

    /// Mean decision confidence; 1.0 when there is nothing to decide.
    pub fn overall_confidence(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        self.all().map(|r| r.decision.confidence).sum::<f64>() / total as f64
    }

    /// Rejected sites that were excluded for their context rather than score.
    pub fn excluded(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| !r.context.is_safe_to_modify)
            .count()
    }

    pub fn recommendation(&self) -> Recommendation {
        let total = self.total();
        if total == 0 {
            return Recommendation::NothingToDo;
        }
        let approved_ratio = self.approved.len() as f64 / total as f64;
        let rejected_ratio = self.rejected.len() as f64 / total as f64;
        if rejected_ratio > 0.3 {
            Recommendation::HighRisk
        } else if approved_ratio > 0.8 {
            Recommendation::SafeToProceed
        } else {
            Recommendation::NeedsCarefulReview
        }
    }

    pub fn next_steps(&self) -> Vec<String> {
        let mut steps = Vec::new();
        if !self.approved.is_empty() {
            steps.push(format!(
                "apply the {} approved conversion(s)",
                self.approved.len()
            ));
        }
        if !self.needs_review.is_empty() {
            steps.push(format!(
                "review {} site(s) by hand before converting",
                self.needs_review.len()
            ));
        }
        if !self.rejected.is_empty() {
            steps.push(format!(
                "leave {} rejected site(s) unchanged or convert them manually",
                self.rejected.len()
            ));
        }
        steps
    }
}
