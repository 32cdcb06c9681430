//! Audit orchestrator.
//!
//! One audit is one session:
//! - acquire a navigated session (navigation failure ends the audit)
//! - phase one: read-only evaluators run concurrently, together with the
//!   ruleset engine when any requested evaluator needs it
//! - phase two: focus-mutating evaluators run one at a time
//! - release the session, then aggregate
//!
//! Each evaluator is isolated: an error, panic or timeout is recorded as a
//! failed outcome under its id and never touches the others.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use lumen_core::{AuditReport, EvaluatorId, EvaluatorOutcome, ReportAggregator};

use crate::classifier::ClassifierBridge;
use crate::config::{ConfigError, RuntimeConfig};
use crate::dom::{BrowserDriver, WebDriverClient};
use crate::evaluators::{AuditContext, Evaluator, EvaluatorRegistry};
use crate::providers::ProviderRegistry;
use crate::resilience::UsageMeter;
use crate::ruleset::{AxeRuleset, RulesetEngine, RulesetError, RulesetRun};
use crate::session::{SessionError, SessionManager};

/// Errors that prevent an audit from producing a report.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ruleset(#[from] RulesetError),

    #[error("orchestrator not configured: {0}")]
    NotConfigured(String),
}

pub struct AuditOrchestrator {
    sessions: SessionManager,
    registry: EvaluatorRegistry,
    classifier: Option<Arc<ClassifierBridge>>,
    ruleset: Option<Arc<dyn RulesetEngine>>,
    config: RuntimeConfig,
    aggregator: ReportAggregator,
}

impl AuditOrchestrator {
    pub fn builder() -> AuditOrchestratorBuilder {
        AuditOrchestratorBuilder::new()
    }

    /// Wire the WebDriver client, classifier provider and axe-core from
    /// `config`.
    ///
    /// A classifier that cannot be built is logged and left out; alt-text
    /// items then report the classifier as unavailable.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, AuditError> {
        config.validate()?;

        let driver = Arc::new(WebDriverClient::new(
            config.browser.clone(),
            config.session.clone(),
        ));

        let classifier = if config.classifier.enabled {
            match ClassifierBridge::from_config(&config.classifier, &ProviderRegistry::with_defaults()) {
                Ok(bridge) => Some(Arc::new(bridge)),
                Err(e) => {
                    tracing::warn!(provider = %config.classifier.provider, error = %e, "Classifier disabled");
                    None
                }
            }
        } else {
            None
        };

        let ruleset: Arc<dyn RulesetEngine> = Arc::new(AxeRuleset::from_config(&config.ruleset)?);

        let mut builder = Self::builder().driver(driver).ruleset(ruleset).config(config);
        if let Some(classifier) = classifier {
            builder = builder.classifier(classifier);
        }
        builder.build()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Run the `requested` evaluators against `url`.
    pub async fn audit(&self, url: &str, requested: &[EvaluatorId]) -> Result<AuditReport, AuditError> {
        self.run(url, requested, false).await
    }

    /// Run every enabled evaluator plus the ruleset engine against `url`.
    pub async fn full_audit(&self, url: &str) -> Result<AuditReport, AuditError> {
        let enabled = self.config.evaluators.enabled.clone();
        self.run(url, &enabled, true).await
    }

    #[tracing::instrument(skip(self, requested), fields(evaluators = requested.len()))]
    async fn run(
        &self,
        url: &str,
        requested: &[EvaluatorId],
        include_ruleset: bool,
    ) -> Result<AuditReport, AuditError> {
        let started = Instant::now();
        let session = self.sessions.acquire(url).await?;

        let ctx = AuditContext {
            url: url.to_string(),
            page: session.page().clone(),
            classifier: self.classifier.clone(),
            usage: Arc::new(UsageMeter::new(self.config.classifier.token_budget)),
            ruleset: Arc::new(RulesetRun::new(self.ruleset.clone())),
            classifier_concurrency: self.config.classifier.concurrency,
        };

        let (serial, concurrent): (Vec<_>, Vec<_>) = self
            .registry
            .select(requested)
            .into_iter()
            .partition(|e| e.mutates_focus());

        let wants_ruleset =
            include_ruleset || requested.iter().any(|id| id.is_ruleset_derived());

        let phase_one = join_all(concurrent.iter().map(|e| self.run_guarded(e.as_ref(), &ctx)));
        let ruleset = async {
            if wants_ruleset {
                // The outcome is memoized in ctx.ruleset
                let _ = ctx.ruleset.violations(ctx.page.as_ref()).await;
            }
        };
        let (mut outcomes, ()) = tokio::join!(phase_one, ruleset);

        for evaluator in &serial {
            outcomes.push(self.run_guarded(evaluator.as_ref(), &ctx).await);
        }

        session.release().await;

        for id in requested {
            if self.registry.get(*id).is_none() {
                outcomes.push((*id, EvaluatorOutcome::failed("evaluator not registered")));
            }
        }

        let usage = requested
            .contains(&EvaluatorId::AltText)
            .then(|| ctx.usage.snapshot());

        let report = self
            .aggregator
            .aggregate(url, requested, outcomes, ctx.ruleset.outcome(), usage);

        tracing::info!(
            failed = report.failed_evaluators().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Audit complete"
        );
        Ok(report)
    }

    async fn run_guarded(
        &self,
        evaluator: &dyn Evaluator,
        ctx: &AuditContext,
    ) -> (EvaluatorId, EvaluatorOutcome) {
        let id = evaluator.id();
        let limit = evaluator.timeout().unwrap_or(self.config.evaluators.timeout);
        let started = Instant::now();

        let run = AssertUnwindSafe(evaluator.run(ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(limit, run).await {
            Ok(Ok(Ok(result))) => {
                tracing::debug!(
                    evaluator = %id,
                    findings = result.results.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Evaluator completed"
                );
                EvaluatorOutcome::Completed(result)
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(evaluator = %id, error = %e, "Evaluator failed");
                EvaluatorOutcome::failed(e.to_string())
            }
            Ok(Err(payload)) => {
                let message = panic_message(&*payload);
                tracing::error!(evaluator = %id, panic = %message, "Evaluator panicked");
                EvaluatorOutcome::failed(format!("evaluator panicked: {}", message))
            }
            Err(_) => {
                tracing::warn!(evaluator = %id, "Evaluator timed out");
                EvaluatorOutcome::failed(format!(
                    "evaluator timed out after {}",
                    humantime::format_duration(limit)
                ))
            }
        };
        (id, outcome)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`AuditOrchestrator`].
pub struct AuditOrchestratorBuilder {
    driver: Option<Arc<dyn BrowserDriver>>,
    config: RuntimeConfig,
    classifier: Option<Arc<ClassifierBridge>>,
    ruleset: Option<Arc<dyn RulesetEngine>>,
    registry: EvaluatorRegistry,
}

impl AuditOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            driver: None,
            config: RuntimeConfig::default(),
            classifier: None,
            ruleset: None,
            registry: EvaluatorRegistry::with_defaults(),
        }
    }

    pub fn driver(mut self, driver: Arc<dyn BrowserDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: Arc<ClassifierBridge>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn ruleset(mut self, ruleset: Arc<dyn RulesetEngine>) -> Self {
        self.ruleset = Some(ruleset);
        self
    }

    /// Register an evaluator, replacing the built-in one with the same id.
    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.registry.register(evaluator);
        self
    }

    pub fn build(self) -> Result<AuditOrchestrator, AuditError> {
        let driver = self
            .driver
            .ok_or_else(|| AuditError::NotConfigured("no browser driver set".to_string()))?;

        Ok(AuditOrchestrator {
            sessions: SessionManager::new(driver, self.config.session.clone()),
            registry: self.registry,
            classifier: self.classifier,
            ruleset: self.ruleset,
            config: self.config,
            aggregator: ReportAggregator::new(),
        })
    }
}

impl Default for AuditOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::{FakeBrowser, FakeDocument, FakeElement};
    use crate::dom::DomError;
    use crate::evaluators::EvaluatorError;
    use async_trait::async_trait;
    use lumen_core::{EvaluatorResult, RulesetOutcome};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    const URL: &str = "https://shop.example.com/";

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Panic,
        Hang,
    }

    /// Stand-in evaluator that logs when it finishes.
    struct Probe {
        id: EvaluatorId,
        focus: bool,
        delay: Duration,
        behaviour: Behaviour,
        log: Arc<Mutex<Vec<EvaluatorId>>>,
    }

    impl Probe {
        fn new(id: EvaluatorId, log: &Arc<Mutex<Vec<EvaluatorId>>>) -> Self {
            Self {
                id,
                focus: false,
                delay: Duration::ZERO,
                behaviour: Behaviour::Succeed,
                log: log.clone(),
            }
        }
    }

    #[async_trait]
    impl Evaluator for Probe {
        fn id(&self) -> EvaluatorId {
            self.id
        }

        fn mutates_focus(&self) -> bool {
            self.focus
        }

        fn timeout(&self) -> Option<Duration> {
            matches!(self.behaviour, Behaviour::Hang).then(|| Duration::from_millis(20))
        }

        async fn run(&self, _ctx: &AuditContext) -> Result<EvaluatorResult, EvaluatorError> {
            tokio::time::sleep(self.delay).await;
            match self.behaviour {
                Behaviour::Succeed => {}
                Behaviour::Panic => panic!("evaluator exploded"),
                Behaviour::Hang => tokio::time::sleep(Duration::from_secs(60)).await,
            }
            self.log.lock().push(self.id);
            Ok(EvaluatorResult::new(self.id, Vec::new()))
        }
    }

    fn fast_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.session.settle_delay = Duration::ZERO;
        config.classifier.enabled = false;
        config
    }

    fn shop_page() -> FakeDocument {
        let mut doc = FakeDocument::new();
        doc.add(
            FakeElement::new("p")
                .text("Free shipping")
                .style("color", "rgb(0, 0, 0)")
                .style("background-color", "rgb(255, 255, 255)"),
        );
        doc.add(FakeElement::new("a").attr("href", "/cart"));
        doc.add(FakeElement::new("img").attr("alt", "").prop("src", "https://shop.example.com/x.png"));
        doc.on_script("axe.run", |_| {
            Ok(json!([{
                "id": "link-name",
                "help": "Links must have discernible text",
                "nodes": [{ "html": "<a href=\"/cart\"></a>", "target": ["a"] }]
            }]))
        });
        doc
    }

    fn orchestrator(browser: Arc<FakeBrowser>) -> AuditOrchestratorBuilder {
        AuditOrchestrator::builder()
            .driver(browser)
            .config(fast_config())
            .ruleset(Arc::new(AxeRuleset::preloaded()))
    }

    #[tokio::test]
    async fn test_full_audit_covers_every_evaluator() {
        let browser = Arc::new(FakeBrowser::new().with_page(URL, shop_page()));
        let orchestrator = orchestrator(browser.clone()).build().unwrap();

        let report = orchestrator.full_audit(URL).await.unwrap();

        assert_eq!(report.evaluators.len(), 8);
        assert!(report.failed_evaluators().is_empty());
        assert!(matches!(
            &report.ruleset,
            RulesetOutcome::Completed { violations } if violations.len() == 1
        ));
        assert_eq!(
            report
                .outcome(EvaluatorId::LinkName)
                .and_then(|o| o.result())
                .map(|r| r.results.len()),
            Some(1)
        );
        assert!(report.classifier_usage.is_some());
        assert_eq!((browser.opened(), browser.closed()), (1, 1));
    }

    #[tokio::test]
    async fn test_ruleset_skipped_when_not_needed() {
        let browser = Arc::new(FakeBrowser::new().with_page(URL, shop_page()));
        let orchestrator = orchestrator(browser).build().unwrap();

        let report = orchestrator.audit(URL, &[EvaluatorId::Contrast]).await.unwrap();
        assert_eq!(report.evaluators.len(), 1);
        assert!(matches!(report.ruleset, RulesetOutcome::NotRun));
        assert!(report.classifier_usage.is_none());
    }

    #[tokio::test]
    async fn test_ruleset_failure_disables_only_link_name() {
        let mut doc = FakeDocument::new();
        doc.add(FakeElement::new("table"));
        doc.on_script("axe.run", |_| Err(DomError::Script("axe is not defined".into())));
        let browser = Arc::new(FakeBrowser::new().with_page(URL, doc));
        let orchestrator = orchestrator(browser.clone()).build().unwrap();

        let report = orchestrator.full_audit(URL).await.unwrap();

        assert_eq!(report.failed_evaluators(), vec![EvaluatorId::LinkName]);
        assert!(matches!(&report.ruleset, RulesetOutcome::Failed { error } if error.contains("axe")));
        assert!(report.outcome(EvaluatorId::TableStructure).unwrap().is_completed());
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_panic_and_timeout_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let browser = Arc::new(FakeBrowser::new().with_page(URL, shop_page()));

        let mut panicking = Probe::new(EvaluatorId::Contrast, &log);
        panicking.behaviour = Behaviour::Panic;
        let mut hanging = Probe::new(EvaluatorId::Label, &log);
        hanging.behaviour = Behaviour::Hang;

        let orchestrator = orchestrator(browser.clone())
            .evaluator(Arc::new(panicking))
            .evaluator(Arc::new(hanging))
            .evaluator(Arc::new(Probe::new(EvaluatorId::Keyboard, &log)))
            .build()
            .unwrap();

        let requested = [EvaluatorId::Contrast, EvaluatorId::Label, EvaluatorId::Keyboard];
        let report = orchestrator.audit(URL, &requested).await.unwrap();

        assert_eq!(
            report.failed_evaluators(),
            vec![EvaluatorId::Contrast, EvaluatorId::Label]
        );
        match report.outcome(EvaluatorId::Contrast) {
            Some(EvaluatorOutcome::Failed { error }) => assert!(error.contains("evaluator exploded")),
            other => panic!("unexpected {:?}", other),
        }
        match report.outcome(EvaluatorId::Label) {
            Some(EvaluatorOutcome::Failed { error }) => assert!(error.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(report.outcome(EvaluatorId::Keyboard).unwrap().is_completed());
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_focus_evaluators_run_after_concurrent_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let browser = Arc::new(FakeBrowser::new().with_page(URL, shop_page()));

        let mut slow = Probe::new(EvaluatorId::Keyboard, &log);
        slow.delay = Duration::from_millis(30);
        let mut focus = Probe::new(EvaluatorId::Focus, &log);
        focus.focus = true;

        let orchestrator = orchestrator(browser)
            .evaluator(Arc::new(slow))
            .evaluator(Arc::new(focus))
            .build()
            .unwrap();

        orchestrator
            .audit(URL, &[EvaluatorId::Focus, EvaluatorId::Keyboard])
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec![EvaluatorId::Keyboard, EvaluatorId::Focus]);
    }

    #[tokio::test]
    async fn test_navigation_failure_produces_no_report() {
        let browser = Arc::new(FakeBrowser::new());
        let orchestrator = orchestrator(browser.clone()).build().unwrap();

        let err = orchestrator.full_audit("https://down.example.com/").await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::Session(SessionError::NavigationFailure { .. })
        ));
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_evaluator_recorded_as_failed() {
        let browser = Arc::new(FakeBrowser::new().with_page(URL, shop_page()));
        let orchestrator = AuditOrchestrator {
            registry: EvaluatorRegistry::new(),
            ..orchestrator(browser).build().unwrap()
        };

        let report = orchestrator.audit(URL, &[EvaluatorId::TableStructure]).await.unwrap();
        match report.outcome(EvaluatorId::TableStructure) {
            Some(EvaluatorOutcome::Failed { error }) => assert_eq!(error, "evaluator not registered"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_builder_requires_driver() {
        assert!(matches!(
            AuditOrchestrator::builder().build(),
            Err(AuditError::NotConfigured(_))
        ));
    }
}
