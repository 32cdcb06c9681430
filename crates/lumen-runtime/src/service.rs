//! Request-level operations shared by the HTTP and CLI surfaces.
//!
//! Input is validated before any session is acquired: a missing URL is a
//! client error and an unknown evaluator is not found.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;

use lumen_core::{AuditReport, EvaluatorId, EvaluatorOutcome, EvaluatorResult};

use crate::orchestrator::{AuditError, AuditOrchestrator};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unknown evaluator: {0}")]
    UnknownEvaluator(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("{evaluator} failed: {error}")]
    EvaluatorFailed { evaluator: EvaluatorId, error: String },

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServiceError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::MissingParameter(_) => 400,
            ServiceError::UnknownEvaluator(_) => 404,
            _ => 500,
        }
    }

    /// `{"error": "..."}` body.
    pub fn to_json(&self) -> JsonValue {
        json!({ "error": self.to_string() })
    }
}

fn require_url(url: Option<&str>) -> Result<&str, ServiceError> {
    match url.map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url),
        _ => Err(ServiceError::MissingParameter("url")),
    }
}

#[derive(Clone)]
pub struct AuditService {
    orchestrator: Arc<AuditOrchestrator>,
}

impl AuditService {
    pub fn new(orchestrator: Arc<AuditOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &AuditOrchestrator {
        &self.orchestrator
    }

    /// Run one evaluator by id (aliases accepted) against `url`.
    pub async fn check(&self, evaluator: &str, url: Option<&str>) -> Result<EvaluatorResult, ServiceError> {
        let id: EvaluatorId = evaluator
            .parse()
            .map_err(|_| ServiceError::UnknownEvaluator(evaluator.to_string()))?;
        let url = require_url(url)?;

        let mut report = self.orchestrator.audit(url, &[id]).await?;
        match report.evaluators.remove(&id) {
            Some(EvaluatorOutcome::Completed(result)) => Ok(result),
            Some(EvaluatorOutcome::Failed { error }) => {
                Err(ServiceError::EvaluatorFailed { evaluator: id, error })
            }
            None => Err(ServiceError::EvaluatorFailed {
                evaluator: id,
                error: "evaluator produced no result".to_string(),
            }),
        }
    }

    /// Run every enabled evaluator plus the ruleset engine against `url`.
    pub async fn full_audit(&self, url: Option<&str>) -> Result<AuditReport, ServiceError> {
        let url = require_url(url)?;
        Ok(self.orchestrator.full_audit(url).await?)
    }

    /// [`check`](Self::check) as a JSON body.
    pub async fn run_check(&self, evaluator: &str, url: Option<&str>) -> Result<JsonValue, ServiceError> {
        Ok(serde_json::to_value(self.check(evaluator, url).await?)?)
    }

    /// [`full_audit`](Self::full_audit) as a JSON body.
    pub async fn run_full_audit(&self, url: Option<&str>) -> Result<JsonValue, ServiceError> {
        Ok(serde_json::to_value(self.full_audit(url).await?)?)
    }
}
