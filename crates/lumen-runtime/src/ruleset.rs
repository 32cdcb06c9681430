//! Ruleset Bridge: runs the axe-core engine inside the page.
//!
//! The engine runs at most once per session; [`RulesetRun`] memoizes the
//! outcome so every ruleset-derived evaluator reads the same violations.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use lumen_core::{RulesetOutcome, Violation};

use crate::config::RulesetConfig;
use crate::dom::Page;

#[derive(Error, Debug, Clone)]
pub enum RulesetError {
    #[error("ruleset invocation failed: {0}")]
    Invocation(String),

    #[error("failed to read ruleset script {path}: {reason}")]
    ScriptUnreadable { path: PathBuf, reason: String },
}

/// An external rule engine evaluated against the live page.
#[async_trait]
pub trait RulesetEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, page: &dyn Page) -> Result<Vec<Violation>, RulesetError>;
}

const RUN_AXE: &str = "\
if (typeof axe === 'undefined') { throw new Error('axe-core is not loaded'); }
return axe.run(document).then(function (results) { return results.violations; });";

/// axe-core, optionally injected from a local bundle first.
pub struct AxeRuleset {
    source: Option<Arc<str>>,
}

impl AxeRuleset {
    /// Use the axe instance the page already loads.
    pub fn preloaded() -> Self {
        Self { source: None }
    }

    /// Inject `source` (an axe-core bundle) before every run.
    pub fn with_source(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }

    pub fn from_config(config: &RulesetConfig) -> Result<Self, RulesetError> {
        match &config.axe_script {
            None => Ok(Self::preloaded()),
            Some(path) => {
                let source =
                    std::fs::read_to_string(path).map_err(|e| RulesetError::ScriptUnreadable {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Self::with_source(source))
            }
        }
    }
}

#[async_trait]
impl RulesetEngine for AxeRuleset {
    fn name(&self) -> &str {
        "axe-core"
    }

    async fn run(&self, page: &dyn Page) -> Result<Vec<Violation>, RulesetError> {
        if let Some(source) = &self.source {
            page.eval_script(source, Vec::new())
                .await
                .map_err(|e| RulesetError::Invocation(format!("injecting axe-core: {}", e)))?;
        }

        let raw = page
            .eval_script(RUN_AXE, Vec::new())
            .await
            .map_err(|e| RulesetError::Invocation(e.to_string()))?;

        serde_json::from_value(raw)
            .map_err(|e| RulesetError::Invocation(format!("unexpected axe-core result: {}", e)))
    }
}

/// The ruleset outcome for one session, computed on first use.
pub struct RulesetRun {
    engine: Option<Arc<dyn RulesetEngine>>,
    cell: OnceCell<Result<Vec<Violation>, RulesetError>>,
}

impl RulesetRun {
    pub fn new(engine: Option<Arc<dyn RulesetEngine>>) -> Self {
        Self {
            engine,
            cell: OnceCell::new(),
        }
    }

    /// Run the engine on first call; later calls share the first outcome.
    pub async fn violations(&self, page: &dyn Page) -> Result<&[Violation], RulesetError> {
        let outcome = self
            .cell
            .get_or_init(|| async {
                let Some(engine) = &self.engine else {
                    return Err(RulesetError::Invocation(
                        "no ruleset engine configured".to_string(),
                    ));
                };
                let result = engine.run(page).await;
                match &result {
                    Ok(v) => tracing::debug!(engine = engine.name(), violations = v.len(), "Ruleset run complete"),
                    Err(e) => tracing::warn!(engine = engine.name(), error = %e, "Ruleset run failed"),
                }
                result
            })
            .await;

        match outcome {
            Ok(violations) => Ok(violations.as_slice()),
            Err(e) => Err(e.clone()),
        }
    }

    /// What the report records for the ruleset.
    pub fn outcome(&self) -> RulesetOutcome {
        match self.cell.get() {
            None => RulesetOutcome::NotRun,
            Some(Ok(violations)) => RulesetOutcome::Completed {
                violations: violations.clone(),
            },
            Some(Err(e)) => RulesetOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}
