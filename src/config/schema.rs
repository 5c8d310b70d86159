use crate::decision::{DecisionError, LearnedLibrary, LearnedPattern};
use crate::registry::{Accessor, FieldRegistry};
use crate::safety::{DEFAULT_BACKUP_DIR, DEFAULT_MAX_BACKUPS};
use crate::scanner::template::FIELD_PLACEHOLDER;
use crate::validate::DEFAULT_SIZE_DELTA_THRESHOLD;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConverterConfig {
    #[serde(default)]
    pub accessor: AccessorConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    /// legacy = canonical; empty means the built-in table
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub learned: LearnedConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AccessorConfig {
    pub expression: Option<String>,
    pub module: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
    pub max_backups: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LearnedConfig {
    #[serde(default)]
    pub safe: Vec<LearnedPattern>,
    #[serde(default)]
    pub risky: Vec<LearnedPattern>,
    /// Use only the configured patterns instead of adding them to the defaults
    #[serde(default)]
    pub replace_defaults: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct VerifyConfig {
    pub size_delta_threshold: Option<f64>,
}

impl ConverterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if let Some(expression) = &self.accessor.expression {
            if expression.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    section: "accessor",
                    field: "expression",
                });
            }
        }
        if let Some(module) = &self.accessor.module {
            if module.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    section: "accessor",
                    field: "module",
                });
            }
        }

        if self.backup.max_backups == Some(0) {
            issues.push(ValidationIssue::InvalidValue {
                section: "backup",
                message: "max_backups must be at least 1".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (legacy, canonical) in &self.fields {
            let legacy_trimmed = legacy.trim();
            if legacy_trimmed.is_empty() || canonical.trim().is_empty() {
                issues.push(ValidationIssue::EmptyFieldName {
                    legacy: legacy.clone(),
                });
            }
            if !legacy_trimmed.is_empty() && !seen.insert(legacy_trimmed) {
                issues.push(ValidationIssue::DuplicateField {
                    legacy: legacy_trimmed.to_string(),
                });
            }
        }

        for (kind, patterns) in [("safe", &self.learned.safe), ("risky", &self.learned.risky)] {
            for pattern in patterns {
                if !pattern.pattern.contains(FIELD_PLACEHOLDER) {
                    issues.push(ValidationIssue::InvalidPattern {
                        kind,
                        pattern: pattern.pattern.clone(),
                        message: format!("missing {FIELD_PLACEHOLDER} placeholder"),
                    });
                }
                if !(0.0..=1.0).contains(&pattern.confidence) {
                    issues.push(ValidationIssue::InvalidPattern {
                        kind,
                        pattern: pattern.pattern.clone(),
                        message: format!("confidence {} outside [0, 1]", pattern.confidence),
                    });
                }
            }
        }

        if let Some(threshold) = self.verify.size_delta_threshold {
            if !threshold.is_finite() || threshold <= 0.0 {
                issues.push(ValidationIssue::InvalidValue {
                    section: "verify",
                    message: format!("size_delta_threshold {threshold} must be positive"),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn accessor(&self) -> Accessor {
        let default = Accessor::default();
        Accessor::new(
            self.accessor
                .expression
                .clone()
                .unwrap_or(default.expression),
            self.accessor.module.clone().unwrap_or(default.module),
        )
    }

    pub fn registry(&self) -> FieldRegistry {
        if self.fields.is_empty() {
            FieldRegistry::with_accessor(self.accessor())
        } else {
            FieldRegistry::from_pairs(
                self.fields
                    .iter()
                    .map(|(legacy, canonical)| (legacy.trim(), canonical.trim())),
                self.accessor(),
            )
        }
    }

    pub fn learned_library(&self, registry: &FieldRegistry) -> Result<LearnedLibrary, DecisionError> {
        let (mut safe, mut risky) = if self.learned.replace_defaults {
            (Vec::new(), Vec::new())
        } else {
            (
                crate::decision::learned::default_safe_patterns(),
                crate::decision::learned::default_risky_patterns(),
            )
        };
        safe.extend(self.learned.safe.iter().cloned());
        risky.extend(self.learned.risky.iter().cloned());
        LearnedLibrary::new(&safe, &risky, registry)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR))
    }

    pub fn max_backups(&self) -> usize {
        self.backup.max_backups.unwrap_or(DEFAULT_MAX_BACKUPS)
    }

    pub fn size_delta_threshold(&self) -> f64 {
        self.verify
            .size_delta_threshold
            .unwrap_or(DEFAULT_SIZE_DELTA_THRESHOLD)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    EmptyFieldName {
        legacy: String,
    },
    DuplicateField {
        legacy: String,
    },
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        message: String,
    },
    InvalidValue {
        section: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { section, field } => {
                write!(f, "[{section}] {field} must not be empty")
            }
            ValidationIssue::EmptyFieldName { legacy } => {
                write!(f, "[fields] mapping {legacy:?} has an empty name")
            }
            ValidationIssue::DuplicateField { legacy } => {
                write!(f, "[fields] legacy name '{legacy}' is mapped more than once")
            }
            ValidationIssue::InvalidPattern {
                kind,
                pattern,
                message,
            } => write!(f, "[learned.{kind}] pattern {pattern:?}: {message}"),
            ValidationIssue::InvalidValue { section, message } => {
                write!(f, "[{section}] {message}")
            }
        }
    }
}
