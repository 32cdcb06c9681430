//! # lumen-runtime
//!
//! Everything in a Lumen audit that touches the outside world: browser
//! sessions over W3C WebDriver, the eight page evaluators, the axe-core
//! ruleset bridge and the LLM classifier used to judge alt text.
//!
//! Deterministic pieces (contrast math, verdict parsing, report assembly)
//! live in `lumen-core`.
//!
//! ## Flow
//!
//! 1. [`SessionManager`] hands out a navigated, settled page from a bounded pool
//! 2. [`AuditOrchestrator`] runs the selected evaluators against it
//! 3. the session is released and `lumen_core::ReportAggregator` builds the report
//!
//! ## Example
//!
//! ```rust,ignore
//! use lumen_runtime::{AuditOrchestrator, RuntimeConfig};
//! use lumen_core::EvaluatorId;
//!
//! let orchestrator = AuditOrchestrator::from_config(RuntimeConfig::default())?;
//! let report = orchestrator
//!     .audit("https://example.com/", &[EvaluatorId::Contrast, EvaluatorId::AltText])
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod dom;
pub mod evaluators;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod ruleset;
pub mod service;
pub mod session;

pub use classifier::{ClassifierBridge, ClassifyError};
pub use config::{
    BrowserConfig, ClassifierConfig, ConfigError, EvaluatorsConfig, RulesetConfig, RuntimeConfig,
    SessionConfig,
};
pub use dom::{BrowserDriver, DomError, ElementHandle, Page, QuerySpec, WebDriverClient};
pub use evaluators::{AuditContext, Evaluator, EvaluatorError, EvaluatorRegistry};
pub use orchestrator::{AuditError, AuditOrchestrator, AuditOrchestratorBuilder};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use ruleset::{AxeRuleset, RulesetEngine, RulesetError};
pub use service::{AuditService, ServiceError};
pub use session::{Session, SessionError, SessionManager};
