//! The eight evaluators.
//!
//! Each evaluator inspects one WCAG concern on a live page and returns an
//! [`EvaluatorResult`]. Per-item problems become unavailable findings; only
//! a failure that leaves nothing to inspect (the top-level query itself, or
//! the ruleset engine) fails the evaluator.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use lumen_core::{EvaluatorId, EvaluatorResult, Finding};

use crate::classifier::ClassifierBridge;
use crate::dom::{DomError, ElementHandle, Page};
use crate::resilience::UsageMeter;
use crate::ruleset::{RulesetError, RulesetRun};

mod alt_text;
mod contrast;
mod focus;
mod keyboard;
mod label;
mod link_name;
mod table;
mod video;

pub use alt_text::AltTextEvaluator;
pub use contrast::ContrastEvaluator;
pub use focus::FocusEvaluator;
pub use keyboard::KeyboardEvaluator;
pub use label::LabelEvaluator;
pub use link_name::LinkNameEvaluator;
pub use table::TableEvaluator;
pub use video::VideoEvaluator;

/// Errors that fail a whole evaluator run.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("element query failed: {0}")]
    Query(#[from] DomError),

    #[error(transparent)]
    Ruleset(#[from] RulesetError),
}

/// Everything an evaluator may touch during one audit.
pub struct AuditContext {
    pub url: String,
    pub page: Arc<dyn Page>,
    pub classifier: Option<Arc<ClassifierBridge>>,
    pub usage: Arc<UsageMeter>,
    pub ruleset: Arc<RulesetRun>,
    /// Concurrent classifier calls within one alt-text run
    pub classifier_concurrency: usize,
}

impl AuditContext {
    pub fn new(url: impl Into<String>, page: Arc<dyn Page>) -> Self {
        Self {
            url: url.into(),
            page,
            classifier: None,
            usage: Arc::new(UsageMeter::default()),
            ruleset: Arc::new(RulesetRun::new(None)),
            classifier_concurrency: 4,
        }
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn id(&self) -> EvaluatorId;

    async fn run(&self, ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError>;

    /// Evaluators that move focus cannot share the page with others.
    fn mutates_focus(&self) -> bool {
        false
    }

    /// Overrides the configured per-evaluator timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Evaluators by id.
#[derive(Clone)]
pub struct EvaluatorRegistry {
    evaluators: BTreeMap<EvaluatorId, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self {
            evaluators: BTreeMap::new(),
        }
    }

    /// Replaces any evaluator registered under the same id.
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(evaluator.id(), evaluator);
    }

    pub fn get(&self, id: EvaluatorId) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(&id).cloned()
    }

    /// Registered evaluators among `ids`, in evaluator order, without
    /// duplicates.
    pub fn select(&self, ids: &[EvaluatorId]) -> Vec<Arc<dyn Evaluator>> {
        self.evaluators
            .iter()
            .filter(|(id, _)| ids.contains(*id))
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<EvaluatorId> {
        self.evaluators.keys().copied().collect()
    }

    /// All eight built-in evaluators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VideoEvaluator));
        registry.register(Arc::new(ContrastEvaluator));
        registry.register(Arc::new(KeyboardEvaluator));
        registry.register(Arc::new(FocusEvaluator));
        registry.register(Arc::new(TableEvaluator));
        registry.register(Arc::new(LabelEvaluator));
        registry.register(Arc::new(AltTextEvaluator));
        registry.register(Arc::new(LinkNameEvaluator));
        registry
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Unavailable finding for item `index` (1-based) after `error`.
pub(crate) fn unavailable(index: usize, element: Option<String>, error: &DomError) -> Finding {
    Finding::unavailable(index, element, error.failure_kind(), error.to_string())
}

/// Tag name for labelling an unavailable item; `None` if that fails too.
pub(crate) async fn tag_or_none(page: &dyn Page, element: &ElementHandle) -> Option<String> {
    page.tag_name(element).await.ok()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::dom::fake::{FakeBrowser, FakeDocument};
    use crate::dom::BrowserDriver;

    pub const URL: &str = "https://example.com/";

    /// Context over a fake page already showing `doc`.
    pub async fn context(doc: FakeDocument) -> AuditContext {
        let browser = FakeBrowser::new().with_page(URL, doc);
        let page = browser.open().await.unwrap();
        page.navigate(URL).await.unwrap();
        AuditContext::new(URL, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_ids() {
        let registry = EvaluatorRegistry::with_defaults();
        assert_eq!(registry.ids(), EvaluatorId::ALL.to_vec());
        for id in EvaluatorId::ALL {
            assert_eq!(registry.get(id).unwrap().id(), id);
        }
    }

    #[test]
    fn test_only_focus_mutates_focus() {
        let registry = EvaluatorRegistry::with_defaults();
        let mutating: Vec<_> = registry
            .select(&EvaluatorId::ALL)
            .into_iter()
            .filter(|e| e.mutates_focus())
            .map(|e| e.id())
            .collect();
        assert_eq!(mutating, vec![EvaluatorId::Focus]);
    }

    #[test]
    fn test_select_dedupes_and_orders() {
        let registry = EvaluatorRegistry::with_defaults();
        let selected: Vec<_> = registry
            .select(&[EvaluatorId::LinkName, EvaluatorId::Contrast, EvaluatorId::LinkName])
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(selected, vec![EvaluatorId::Contrast, EvaluatorId::LinkName]);
    }
}
