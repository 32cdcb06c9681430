//! # lumen-core
//!
//! Deterministic building blocks of a page accessibility audit.
//!
//! Nothing in this crate talks to a browser or a network service. It holds
//! the pieces whose output depends only on their input:
//!
//! - the Contrast Engine (WCAG 1.4.3 contrast ratio)
//! - strict parsing of classifier verdicts against an embedded schema
//! - finding, summary and report types
//! - the Report Aggregator and report export
//!
//! ## Example
//!
//! ```rust
//! use lumen_core::contrast;
//!
//! let result = contrast::evaluate("rgb(0, 0, 0)", "rgb(255, 255, 255)");
//! assert!(result.compliant);
//! assert!((result.ratio - 21.0).abs() < 1e-2);
//! ```

pub mod contrast;
pub mod export;
pub mod findings;
pub mod report;
pub mod ruleset;
pub mod types;
pub mod verdict;

pub use contrast::ContrastResult;
pub use export::{export, ExportError};
pub use findings::{
    AltTextFinding, ContrastFinding, FailureKind, Finding, FocusFinding, ItemFailure,
    KeyboardFinding, LabelFinding, Presence, TableFinding, UnavailableItem, VideoFinding,
};
pub use report::{AuditReport, ClassifierUsage, EvaluatorOutcome, ReportAggregator, RulesetOutcome};
pub use ruleset::{link_name_violations, LinkViolation, Violation};
pub use types::{
    compliance_percentage, EvaluatorId, EvaluatorResult, Summary, SummaryKind, UnknownEvaluator,
};
pub use verdict::{parse_verdict, ClassificationVerdict, Verdict, VerdictParseError};
