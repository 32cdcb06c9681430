//! Report Aggregator: merges evaluator outcomes into one audit report.
//!
//! Aggregation never fails. An evaluator that errored, timed out, or never
//! reported back is recorded as failed under its own key, so the report
//! always accounts for every requested evaluator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::ruleset::Violation;
use crate::types::{EvaluatorId, EvaluatorResult};

/// What happened to one evaluator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluatorOutcome {
    Completed(EvaluatorResult),
    Failed { error: String },
}

impl EvaluatorOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        EvaluatorOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, EvaluatorOutcome::Completed(_))
    }

    pub fn result(&self) -> Option<&EvaluatorResult> {
        match self {
            EvaluatorOutcome::Completed(result) => Some(result),
            EvaluatorOutcome::Failed { .. } => None,
        }
    }
}

/// What happened to the ruleset engine for this session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RulesetOutcome {
    Completed { violations: Vec<Violation> },
    Failed { error: String },
    /// No requested evaluator needed the ruleset engine
    NotRun,
}

/// Classifier usage for one audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierUsage {
    /// Provider calls that returned a response
    pub calls: u64,
    pub cache_hits: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Items that ended without a verdict
    pub failures: u64,
}

/// Complete result of auditing one page.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub url: String,
    pub audited_at: DateTime<Utc>,

    /// Keyed by evaluator id, in evaluator order
    pub evaluators: BTreeMap<EvaluatorId, EvaluatorOutcome>,

    pub ruleset: RulesetOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_usage: Option<ClassifierUsage>,
}

impl AuditReport {
    pub fn outcome(&self, id: EvaluatorId) -> Option<&EvaluatorOutcome> {
        self.evaluators.get(&id)
    }

    /// Ids of evaluators recorded as failed.
    pub fn failed_evaluators(&self) -> Vec<EvaluatorId> {
        self.evaluators
            .iter()
            .filter(|(_, outcome)| !outcome.is_completed())
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Folds evaluator outcomes into an [`AuditReport`].
#[derive(Debug, Default)]
pub struct ReportAggregator;

impl ReportAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Merge outcomes keyed by evaluator id.
    ///
    /// The first outcome reported for an id wins. Every id in `requested`
    /// without an outcome is recorded as failed.
    pub fn aggregate(
        &self,
        url: impl Into<String>,
        requested: &[EvaluatorId],
        outcomes: impl IntoIterator<Item = (EvaluatorId, EvaluatorOutcome)>,
        ruleset: RulesetOutcome,
        classifier_usage: Option<ClassifierUsage>,
    ) -> AuditReport {
        let mut evaluators = BTreeMap::new();

        for (id, outcome) in outcomes {
            if evaluators.contains_key(&id) {
                tracing::warn!(evaluator = %id, "duplicate evaluator outcome ignored");
                continue;
            }
            evaluators.insert(id, outcome);
        }

        for id in requested {
            evaluators
                .entry(*id)
                .or_insert_with(|| EvaluatorOutcome::failed("evaluator produced no result"));
        }

        AuditReport {
            url: url.into(),
            audited_at: Utc::now(),
            evaluators,
            ruleset,
            classifier_usage,
        }
    }
}
