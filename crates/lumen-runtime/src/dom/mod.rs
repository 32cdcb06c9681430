//! DOM Query Adapter.
//!
//! Evaluators see a rendered page only through the [`Page`] trait. The
//! production implementation speaks W3C WebDriver ([`webdriver`]); tests use
//! the in-memory [`fake`] page.
//!
//! Every call can fail on its own. Failures are [`DomError`]s that map onto
//! the per-item failure kinds, so an evaluator records the item as
//! unavailable and moves on.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

use lumen_core::FailureKind;

pub mod webdriver;

#[cfg(any(test, feature = "testkit"))]
pub mod fake;

pub use webdriver::{WebDriverClient, WebDriverPage};

/// W3C web element reference key.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomError {
    #[error("element query failed: {0}")]
    ElementQuery(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser session error: {0}")]
    Session(String),
}

impl DomError {
    /// Per-item failure kind for this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DomError::Script(_) => FailureKind::ScriptExecutionError,
            DomError::Timeout(_) => FailureKind::Timeout,
            DomError::ElementQuery(_) | DomError::Navigation(_) | DomError::Session(_) => {
                FailureKind::ElementQueryFailure
            }
        }
    }
}

/// Opaque reference to an element of the current document.
///
/// Two handles are equal when they refer to the same element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The handle as a script argument (W3C element reference).
    pub fn as_script_arg(&self) -> JsonValue {
        serde_json::json!({ ELEMENT_KEY: self.id })
    }
}

/// Typed element query.
///
/// Structural queries (`FollowingSibling`, `AncestorWithAnyAttribute`) are
/// only meaningful relative to an element, via [`Page::find_within`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySpec {
    /// Descendants with this tag name
    Tag(&'static str),
    /// Union of queries, in document order
    AnyOf(Vec<QuerySpec>),
    /// Descendants carrying this attribute
    WithAttribute(&'static str),
    /// Elements with at least one direct text node
    HasText,
    /// Later siblings with `tag` whose class contains `class_contains`
    FollowingSibling {
        tag: &'static str,
        class_contains: &'static str,
    },
    /// Ancestors carrying any of these attributes
    AncestorWithAnyAttribute(Vec<&'static str>),
    /// `<label for="...">` elements pointing at this id
    LabelFor(String),
}

impl QuerySpec {
    /// Interactive controls plus anything with a `tabindex`.
    pub fn focusable() -> Self {
        QuerySpec::AnyOf(vec![
            QuerySpec::Tag("a"),
            QuerySpec::Tag("button"),
            QuerySpec::Tag("input"),
            QuerySpec::Tag("textarea"),
            QuerySpec::Tag("select"),
            QuerySpec::WithAttribute("tabindex"),
        ])
    }

    /// Labelable form controls.
    pub fn form_controls() -> Self {
        QuerySpec::AnyOf(vec![
            QuerySpec::Tag("input"),
            QuerySpec::Tag("select"),
            QuerySpec::Tag("textarea"),
        ])
    }

    /// XPath for this query; `scoped` makes descendant queries relative to
    /// the context element.
    pub fn to_xpath(&self, scoped: bool) -> String {
        let prefix = if scoped { ".//" } else { "//" };
        match self {
            QuerySpec::Tag(tag) => format!("{}{}", prefix, tag),
            QuerySpec::AnyOf(specs) => specs
                .iter()
                .map(|s| s.to_xpath(scoped))
                .collect::<Vec<_>>()
                .join(" | "),
            QuerySpec::WithAttribute(attr) => format!("{}*[@{}]", prefix, attr),
            QuerySpec::HasText => format!("{}*[text()]", prefix),
            QuerySpec::FollowingSibling {
                tag,
                class_contains,
            } => format!(
                "following-sibling::{}[contains(@class, {})]",
                tag,
                xpath_literal(class_contains)
            ),
            QuerySpec::AncestorWithAnyAttribute(attrs) => {
                let test = attrs
                    .iter()
                    .map(|a| format!("@{}", a))
                    .collect::<Vec<_>>()
                    .join(" or ");
                format!("ancestor::*[{}]", test)
            }
            QuerySpec::LabelFor(id) => format!("{}label[@for={}]", prefix, xpath_literal(id)),
        }
    }
}

/// Quote `value` as an XPath 1.0 string literal.
///
/// XPath has no escape sequences, so a value holding both quote kinds is
/// assembled with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let pieces: Vec<String> = value
        .split('\'')
        .map(|piece| format!("'{}'", piece))
        .collect();
    format!("concat({})", pieces.join(", \"'\", "))
}

/// A live, navigated document.
#[async_trait]
pub trait Page: Send + Sync {
    /// Browser session identifier, for logs.
    fn session_id(&self) -> &str;

    async fn navigate(&self, url: &str) -> Result<(), DomError>;

    async fn find_all(&self, query: &QuerySpec) -> Result<Vec<ElementHandle>, DomError>;

    async fn find_within(
        &self,
        element: &ElementHandle,
        query: &QuerySpec,
    ) -> Result<Vec<ElementHandle>, DomError>;

    /// Raw attribute value, `None` when absent.
    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DomError>;

    /// DOM property as a string, `None` when null or undefined. Unlike the
    /// attribute, `src` and `href` properties are absolute URLs.
    async fn property(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DomError>;

    async fn computed_style(&self, element: &ElementHandle, property: &str) -> Result<String, DomError>;

    /// Rendered text.
    async fn text(&self, element: &ElementHandle) -> Result<String, DomError>;

    /// Lowercase tag name.
    async fn tag_name(&self, element: &ElementHandle) -> Result<String, DomError>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DomError>;

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DomError>;

    /// Click-equivalent activation.
    async fn activate(&self, element: &ElementHandle) -> Result<(), DomError>;

    /// Element holding focus, `None` when focus is on the document body.
    async fn active_element(&self) -> Result<Option<ElementHandle>, DomError>;

    /// Run `script` as a function body with `args` bound to `arguments`.
    /// A returned promise is awaited.
    async fn eval_script(&self, script: &str, args: Vec<JsonValue>) -> Result<JsonValue, DomError>;

    /// End the browser session.
    async fn close(&self) -> Result<(), DomError>;
}

/// Opens browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// A fresh session with a blank document.
    async fn open(&self) -> Result<Arc<dyn Page>, DomError>;
}
