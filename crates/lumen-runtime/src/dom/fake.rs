//! In-memory browser for tests.
//!
//! A [`FakeDocument`] is a small element tree built in code. [`FakeBrowser`]
//! serves documents by URL and counts sessions so tests can check that every
//! opened session was closed. Queries are answered from the [`QuerySpec`]
//! directly, without XPath.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{BrowserDriver, DomError, ElementHandle, Page, QuerySpec};

pub type NodeId = usize;

/// Calls that can be made to fail per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    FindWithin,
    Attribute,
    Property,
    Style,
    Text,
    TagName,
    Visible,
    Enabled,
    Activate,
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    tag: String,
    attributes: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    text: String,
    visible: bool,
    enabled: bool,
    focusable: Option<bool>,
    failures: HashMap<FakeOp, DomError>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            styles: BTreeMap::new(),
            text: String::new(),
            visible: true,
            enabled: true,
            focusable: None,
            failures: HashMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn prop(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Activation leaves focus on the body.
    pub fn unfocusable(mut self) -> Self {
        self.focusable = Some(false);
        self
    }

    pub fn focusable(mut self) -> Self {
        self.focusable = Some(true);
        self
    }

    pub fn failing(mut self, op: FakeOp, error: DomError) -> Self {
        self.failures.insert(op, error);
        self
    }

    fn takes_focus(&self) -> bool {
        self.focusable.unwrap_or_else(|| {
            self.enabled
                && (matches!(
                    self.tag.as_str(),
                    "a" | "button" | "input" | "textarea" | "select"
                ) || self.attributes.contains_key("tabindex"))
        })
    }

    fn check(&self, op: FakeOp) -> Result<(), DomError> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

type ScriptHandler = Arc<dyn Fn(&[JsonValue]) -> Result<JsonValue, DomError> + Send + Sync>;

/// An element tree plus script handlers.
#[derive(Clone, Default)]
pub struct FakeDocument {
    nodes: Vec<FakeElement>,
    roots: Vec<NodeId>,
    scripts: Vec<(String, ScriptHandler)>,
    query_failure: Option<DomError>,
}

impl std::fmt::Debug for FakeDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDocument")
            .field("nodes", &self.nodes.len())
            .field("scripts", &self.scripts.len())
            .finish()
    }
}

impl FakeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a top-level element.
    pub fn add(&mut self, element: FakeElement) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(element);
        self.roots.push(id);
        id
    }

    /// Append `element` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, mut element: FakeElement) -> NodeId {
        let id = self.nodes.len();
        element.parent = Some(parent);
        self.nodes.push(element);
        self.nodes[parent].children.push(id);
        id
    }

    /// Scripts containing `needle` are answered by `handler`. Other scripts
    /// evaluate to `null`.
    pub fn on_script<F>(&mut self, needle: &str, handler: F)
    where
        F: Fn(&[JsonValue]) -> Result<JsonValue, DomError> + Send + Sync + 'static,
    {
        self.scripts.push((needle.to_string(), Arc::new(handler)));
    }

    /// Every document-level query fails with `error`.
    pub fn fail_queries(&mut self, error: DomError) {
        self.query_failure = Some(error);
    }

    fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for &root in &self.roots {
            self.walk(root, &mut order);
        }
        order
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        for &child in &self.nodes[node].children {
            self.walk(child, &mut order);
        }
        order
    }

    fn walk(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.push(node);
        for &child in &self.nodes[node].children {
            self.walk(child, out);
        }
    }

    fn siblings_after(&self, node: NodeId) -> Vec<NodeId> {
        let siblings = match self.nodes[node].parent {
            Some(parent) => &self.nodes[parent].children,
            None => &self.roots,
        };
        siblings
            .iter()
            .skip_while(|&&n| n != node)
            .skip(1)
            .copied()
            .collect()
    }

    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes[node].parent;
        while let Some(n) = current {
            chain.push(n);
            current = self.nodes[n].parent;
        }
        chain.reverse();
        chain
    }

    fn matches(&self, node: NodeId, query: &QuerySpec) -> bool {
        let el = &self.nodes[node];
        match query {
            QuerySpec::Tag(tag) => el.tag == *tag,
            QuerySpec::AnyOf(specs) => specs.iter().any(|s| self.matches(node, s)),
            QuerySpec::WithAttribute(attr) => el.attributes.contains_key(*attr),
            QuerySpec::HasText => !el.text.is_empty(),
            QuerySpec::LabelFor(id) => {
                el.tag == "label" && el.attributes.get("for").map(String::as_str) == Some(id.as_str())
            }
            QuerySpec::FollowingSibling { .. } | QuerySpec::AncestorWithAnyAttribute(_) => false,
        }
    }

    fn query_within(&self, node: NodeId, query: &QuerySpec) -> Vec<NodeId> {
        match query {
            QuerySpec::FollowingSibling {
                tag,
                class_contains,
            } => self
                .siblings_after(node)
                .into_iter()
                .filter(|&n| {
                    let el = &self.nodes[n];
                    el.tag == *tag
                        && el
                            .attributes
                            .get("class")
                            .is_some_and(|c| c.contains(class_contains))
                })
                .collect(),
            QuerySpec::AncestorWithAnyAttribute(attrs) => self
                .ancestors(node)
                .into_iter()
                .filter(|&n| attrs.iter().any(|a| self.nodes[n].attributes.contains_key(*a)))
                .collect(),
            other => self
                .descendants(node)
                .into_iter()
                .filter(|&n| self.matches(n, other))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Serves [`FakeDocument`]s by URL.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: Arc<RwLock<HashMap<String, Arc<FakeDocument>>>>,
    counters: Arc<SessionCounters>,
    navigation_delay: Option<Duration>,
    refuse_sessions: bool,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, document: FakeDocument) -> Self {
        self.pages.write().insert(url.to_string(), Arc::new(document));
        self
    }

    /// Navigation sleeps this long before completing.
    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    /// `open` fails, as when the driver is down.
    pub fn refusing_sessions(mut self) -> Self {
        self.refuse_sessions = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open(&self) -> Result<Arc<dyn Page>, DomError> {
        if self.refuse_sessions {
            return Err(DomError::Session("connection refused".to_string()));
        }
        let n = self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            session_id: format!("fake-session-{}", n),
            pages: self.pages.clone(),
            counters: self.counters.clone(),
            navigation_delay: self.navigation_delay,
            document: RwLock::new(None),
            active: Mutex::new(None),
        }))
    }
}

pub struct FakePage {
    session_id: String,
    pages: Arc<RwLock<HashMap<String, Arc<FakeDocument>>>>,
    counters: Arc<SessionCounters>,
    navigation_delay: Option<Duration>,
    document: RwLock<Option<Arc<FakeDocument>>>,
    active: Mutex<Option<NodeId>>,
}

impl FakePage {
    fn document(&self) -> Result<Arc<FakeDocument>, DomError> {
        self.document
            .read()
            .clone()
            .ok_or_else(|| DomError::ElementQuery("no document loaded".to_string()))
    }

    fn resolve(&self, element: &ElementHandle) -> Result<(Arc<FakeDocument>, NodeId), DomError> {
        let doc = self.document()?;
        let node = element
            .id()
            .strip_prefix("node-")
            .and_then(|n| n.parse::<NodeId>().ok())
            .filter(|&n| n < doc.nodes.len())
            .ok_or_else(|| {
                DomError::ElementQuery(format!("stale element reference: {}", element.id()))
            })?;
        Ok((doc, node))
    }

    fn element_op<T>(
        &self,
        element: &ElementHandle,
        op: FakeOp,
        read: impl FnOnce(&FakeElement) -> T,
    ) -> Result<T, DomError> {
        let (doc, node) = self.resolve(element)?;
        let el = &doc.nodes[node];
        el.check(op)?;
        Ok(read(el))
    }
}

fn handle(node: NodeId) -> ElementHandle {
    ElementHandle::new(format!("node-{}", node))
}

#[async_trait]
impl Page for FakePage {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn navigate(&self, url: &str) -> Result<(), DomError> {
        if let Some(delay) = self.navigation_delay {
            tokio::time::sleep(delay).await;
        }
        let doc = self
            .pages
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| DomError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))?;
        *self.document.write() = Some(doc);
        *self.active.lock() = None;
        Ok(())
    }

    async fn find_all(&self, query: &QuerySpec) -> Result<Vec<ElementHandle>, DomError> {
        let doc = self.document()?;
        if let Some(err) = &doc.query_failure {
            return Err(err.clone());
        }
        Ok(doc
            .document_order()
            .into_iter()
            .filter(|&n| doc.matches(n, query))
            .map(handle)
            .collect())
    }

    async fn find_within(
        &self,
        element: &ElementHandle,
        query: &QuerySpec,
    ) -> Result<Vec<ElementHandle>, DomError> {
        let (doc, node) = self.resolve(element)?;
        doc.nodes[node].check(FakeOp::FindWithin)?;
        Ok(doc.query_within(node, query).into_iter().map(handle).collect())
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DomError> {
        self.element_op(element, FakeOp::Attribute, |el| el.attributes.get(name).cloned())
    }

    async fn property(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DomError> {
        self.element_op(element, FakeOp::Property, |el| {
            el.properties
                .get(name)
                .or_else(|| el.attributes.get(name))
                .cloned()
        })
    }

    async fn computed_style(&self, element: &ElementHandle, property: &str) -> Result<String, DomError> {
        self.element_op(element, FakeOp::Style, |el| {
            el.styles.get(property).cloned().unwrap_or_else(|| match property {
                "background-color" => "rgba(0, 0, 0, 0)".to_string(),
                _ => "rgba(0, 0, 0, 1)".to_string(),
            })
        })
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DomError> {
        self.element_op(element, FakeOp::Text, |el| {
            if el.visible {
                el.text.clone()
            } else {
                String::new()
            }
        })
    }

    async fn tag_name(&self, element: &ElementHandle) -> Result<String, DomError> {
        self.element_op(element, FakeOp::TagName, |el| el.tag.clone())
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DomError> {
        self.element_op(element, FakeOp::Visible, |el| el.visible)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DomError> {
        self.element_op(element, FakeOp::Enabled, |el| el.enabled)
    }

    async fn activate(&self, element: &ElementHandle) -> Result<(), DomError> {
        let (doc, node) = self.resolve(element)?;
        let el = &doc.nodes[node];
        el.check(FakeOp::Activate)?;
        *self.active.lock() = el.takes_focus().then_some(node);
        Ok(())
    }

    async fn active_element(&self) -> Result<Option<ElementHandle>, DomError> {
        Ok(self.active.lock().map(handle))
    }

    async fn eval_script(&self, script: &str, args: Vec<JsonValue>) -> Result<JsonValue, DomError> {
        let doc = self.document()?;
        match doc.scripts.iter().find(|(needle, _)| script.contains(needle.as_str())) {
            Some((_, handler)) => handler(&args),
            None => Ok(JsonValue::Null),
        }
    }

    async fn close(&self) -> Result<(), DomError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
