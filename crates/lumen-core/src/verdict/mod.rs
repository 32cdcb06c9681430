//! Classifier verdicts for alt text.
//!
//! The multimodal classifier is untrusted: its reply is raw text that is
//! expected, not guaranteed, to be `{"verdict": ..., "suggestedText": ...}`.
//! A reply becomes a [`ClassificationVerdict`] only if it parses as JSON and
//! validates against the embedded schema. Everything else is a
//! [`VerdictParseError`] carrying a diagnostic.

mod schema;

pub use schema::{validate_verdict_schema, SchemaError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How well the alt text describes the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Appropriate,
    PartiallyAppropriate,
    Inappropriate,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Appropriate => "appropriate",
            Verdict::PartiallyAppropriate => "partially_appropriate",
            Verdict::Inappropriate => "inappropriate",
        }
    }
}

/// A validated classifier judgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub verdict: Verdict,

    /// Replacement text proposed by the classifier
    #[serde(rename = "suggestedText")]
    pub suggested_text: String,
}

impl ClassificationVerdict {
    /// Only a fully appropriate verdict counts as compliant.
    pub fn is_compliant(&self) -> bool {
        self.verdict == Verdict::Appropriate
    }
}

/// Why a classifier reply was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictParseError {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    #[error("response does not match the verdict schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("verdict schema unavailable: {0}")]
    SchemaUnavailable(String),
}

/// Strictly parse a raw classifier reply.
///
/// Surrounding whitespace and a single Markdown code fence are tolerated
/// since chat models commonly wrap JSON that way; nothing else is.
pub fn parse_verdict(raw: &str) -> Result<ClassificationVerdict, VerdictParseError> {
    let body = strip_code_fence(raw.trim());

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| VerdictParseError::NotJson(e.to_string()))?;

    validate_verdict_schema(&value).map_err(VerdictParseError::SchemaViolation)?;

    serde_json::from_value(value).map_err(|e| VerdictParseError::SchemaViolation(vec![e.to_string()]))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
