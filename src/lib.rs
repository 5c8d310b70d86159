//! Field Mapper Converter: safe migration of legacy field-name access
//!
//! Rewrites direct references to legacy field names (`obj.channelName`,
//! `{ channelName: ... }`, `a.channelName || b.channelName`) into calls of an
//! indirection accessor (`obj[FieldMapper.get('CHANNEL_NAME')]`).
//!
//! # Architecture
//!
//! A strictly sequential pipeline per file:
//!
//! 1. [`scanner`]: lexical, template-based detection of candidate sites
//! 2. [`context`]: one forward lexical pass; file metrics and per-site context
//! 3. [`decision`]: weighted scoring into approve / review / reject
//! 4. [`safety`]: checksummed, versioned backup before anything is written
//! 5. [`edit`]: descending-offset splice of approved rewrites, atomic write
//! 6. [`validate`]: read-back checksum, tree-sitter parse check, size delta
//! 7. [`report`]: format-independent summary, rendered on demand
//!
//! [`converter::Converter`] sequences the stages and owns the rollback
//! session.
//!
//! # Safety
//!
//! - A backup exists on disk before a file is written
//! - Restores verify checksums before and after overwriting
//! - Rejected sites and sites in strings, comments or regexes are never applied
//! - Any failure after the backup restores the file before it is reported
//!
//! # Example
//!
//! ```no_run
//! use field_mapper_converter::{ConversionOptions, Converter, ConverterConfig};
//! use std::path::Path;
//!
//! let options = ConversionOptions {
//!     auto_approve: true,
//!     ..Default::default()
//! };
//! let mut converter = Converter::new(&ConverterConfig::default(), options)?;
//! let outcome = converter.convert_file(Path::new("src/views.js"));
//! println!("success: {}", outcome.success);
//! # Ok::<(), field_mapper_converter::ConversionError>(())
//! ```

pub mod config;
pub mod context;
pub mod converter;
pub mod decision;
pub mod edit;
pub mod lines;
pub mod registry;
pub mod report;
pub mod safety;
pub mod scanner;
pub mod syntax;
pub mod validate;
pub mod walk;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, ConverterConfig};
pub use context::{ContextClassifier, ContextType, FileContext, Language, SiteContext};
pub use converter::{
    AcceptAll, ApprovalPrompt, ApprovalRequest, BatchOutcome, ConversionError, ConversionOptions,
    Converter, FileOutcome, FileReport,
};
pub use decision::{Action, Decision, DecisionEngine, Review};
pub use edit::{Edit, EditError};
pub use registry::{Accessor, FieldMapping, FieldRegistry};
pub use report::{generate_report, ReportFormat, ReportSummary, RiskLevel};
pub use safety::{BackupRecord, SafetyError, SafetyManager, Session, VersionSelector};
pub use scanner::{apply_auto_conversions, PatternKind, PatternScanner, ScanResult, ViolationSite};
pub use validate::{validate_edit, ValidationError};
