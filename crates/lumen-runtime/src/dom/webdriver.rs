//! W3C WebDriver client.
//!
//! Talks to chromedriver (or any W3C-conformant server) over HTTP. Page
//! loads are bounded by the navigation timeout and every other command by
//! the script timeout. Responses use the
//! `{"value": ...}` envelope and errors carry a W3C error code that decides
//! the [`DomError`] variant.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use super::{BrowserDriver, DomError, ElementHandle, Page, QuerySpec, ELEMENT_KEY};
use crate::config::{BrowserConfig, SessionConfig};

/// Opens Chrome sessions against a WebDriver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    browser: BrowserConfig,
    session: SessionConfig,
}

impl WebDriverClient {
    pub fn new(browser: BrowserConfig, session: SessionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: browser.webdriver_url.trim_end_matches('/').to_string(),
            browser,
            session,
        }
    }

    fn capabilities(&self) -> JsonValue {
        let mut args = self.browser.args.clone();
        args.push(format!(
            "--window-size={},{}",
            self.browser.window_width, self.browser.window_height
        ));
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn open(&self) -> Result<Arc<dyn Page>, DomError> {
        let created = send(
            &self.http,
            Method::POST,
            format!("{}/session", self.base_url),
            Some(self.capabilities()),
            self.session.navigation_timeout + self.session.script_timeout,
        )
        .await
        .map_err(|e| DomError::Session(e.to_string()))?;

        let session_id = created["sessionId"]
            .as_str()
            .ok_or_else(|| DomError::Session("new session response has no sessionId".to_string()))?
            .to_string();

        let page = WebDriverPage {
            http: self.http.clone(),
            base_url: format!("{}/session/{}", self.base_url, session_id),
            session_id,
            command_timeout: self.session.script_timeout,
            navigation_timeout: self.session.navigation_timeout,
        };

        let timeouts = json!({
            "script": self.session.script_timeout.as_millis() as u64,
            "pageLoad": self.session.navigation_timeout.as_millis() as u64,
            "implicit": 0,
        });
        if let Err(e) = page.command(Method::POST, "/timeouts", Some(timeouts)).await {
            let _ = page.close().await;
            return Err(DomError::Session(format!("setting timeouts failed: {}", e)));
        }

        tracing::debug!(session = %page.session_id, "Opened WebDriver session");
        Ok(Arc::new(page))
    }
}

/// One WebDriver session.
#[derive(Debug)]
pub struct WebDriverPage {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    command_timeout: Duration,
    navigation_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

fn map_error_code(code: &str, message: String) -> DomError {
    match code {
        "javascript error" => DomError::Script(message),
        "script timeout" | "timeout" => DomError::Timeout(message),
        "invalid session id" | "session not created" => DomError::Session(message),
        _ => DomError::ElementQuery(format!("{}: {}", code, message)),
    }
}

async fn send(
    http: &reqwest::Client,
    method: Method,
    url: String,
    body: Option<JsonValue>,
    timeout: Duration,
) -> Result<JsonValue, DomError> {
    let mut request = http.request(method, &url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            DomError::Timeout(format!("no response within {:?}", timeout))
        } else {
            DomError::Session(format!("webdriver unreachable: {}", e))
        }
    })?;

    let status = response.status();
    let envelope: JsonValue = response.json().await.map_err(|e| {
        DomError::Session(format!("unreadable webdriver response ({}): {}", status, e))
    })?;
    let value = envelope.get("value").cloned().unwrap_or(JsonValue::Null);

    if status.is_success() {
        return Ok(value);
    }

    match serde_json::from_value::<ErrorValue>(value) {
        Ok(err) => Err(map_error_code(&err.error, err.message)),
        Err(_) => Err(DomError::Session(format!("webdriver returned {}", status))),
    }
}

fn element_from(value: &JsonValue) -> Result<ElementHandle, DomError> {
    value[ELEMENT_KEY]
        .as_str()
        .map(ElementHandle::new)
        .ok_or_else(|| DomError::ElementQuery(format!("not an element reference: {}", value)))
}

fn elements_from(value: JsonValue) -> Result<Vec<ElementHandle>, DomError> {
    match value {
        JsonValue::Array(items) => items.iter().map(element_from).collect(),
        other => Err(DomError::ElementQuery(format!(
            "expected element list, got {}",
            other
        ))),
    }
}

fn string_or_none(value: JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl WebDriverPage {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<JsonValue, DomError> {
        send(
            &self.http,
            method,
            format!("{}{}", self.base_url, path),
            body,
            self.command_timeout,
        )
        .await
    }

    async fn get_element(&self, element: &ElementHandle, suffix: &str) -> Result<JsonValue, DomError> {
        self.command(
            Method::GET,
            &format!("/element/{}/{}", element.id(), suffix),
            None,
        )
        .await
    }
}

#[async_trait]
impl Page for WebDriverPage {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn navigate(&self, url: &str) -> Result<(), DomError> {
        send(
            &self.http,
            Method::POST,
            format!("{}/url", self.base_url),
            Some(json!({ "url": url })),
            self.navigation_timeout,
        )
        .await
        .map(|_| ())
        .map_err(|e| DomError::Navigation(e.to_string()))
    }

    async fn find_all(&self, query: &QuerySpec) -> Result<Vec<ElementHandle>, DomError> {
        let body = json!({ "using": "xpath", "value": query.to_xpath(false) });
        elements_from(self.command(Method::POST, "/elements", Some(body)).await?)
    }

    async fn find_within(
        &self,
        element: &ElementHandle,
        query: &QuerySpec,
    ) -> Result<Vec<ElementHandle>, DomError> {
        let body = json!({ "using": "xpath", "value": query.to_xpath(true) });
        let path = format!("/element/{}/elements", element.id());
        elements_from(self.command(Method::POST, &path, Some(body)).await?)
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DomError> {
        let value = self
            .get_element(element, &format!("attribute/{}", name))
            .await?;
        Ok(string_or_none(value))
    }

    async fn property(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DomError> {
        let value = self
            .get_element(element, &format!("property/{}", name))
            .await?;
        Ok(string_or_none(value))
    }

    async fn computed_style(&self, element: &ElementHandle, property: &str) -> Result<String, DomError> {
        let value = self.get_element(element, &format!("css/{}", property)).await?;
        Ok(string_or_none(value).unwrap_or_default())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DomError> {
        Ok(string_or_none(self.get_element(element, "text").await?).unwrap_or_default())
    }

    async fn tag_name(&self, element: &ElementHandle) -> Result<String, DomError> {
        let value = self.get_element(element, "name").await?;
        Ok(string_or_none(value).unwrap_or_default().to_lowercase())
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, DomError> {
        Ok(self
            .get_element(element, "displayed")
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DomError> {
        Ok(self
            .get_element(element, "enabled")
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn activate(&self, element: &ElementHandle) -> Result<(), DomError> {
        let path = format!("/element/{}/click", element.id());
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn active_element(&self) -> Result<Option<ElementHandle>, DomError> {
        match self.command(Method::GET, "/element/active", None).await {
            Ok(JsonValue::Null) => Ok(None),
            Ok(value) => element_from(&value).map(Some),
            // Focus on the body reports as "no such element" on some drivers
            Err(DomError::ElementQuery(msg)) if msg.starts_with("no such element") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn eval_script(&self, script: &str, args: Vec<JsonValue>) -> Result<JsonValue, DomError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn close(&self) -> Result<(), DomError> {
        self.command(Method::DELETE, "", None).await?;
        tracing::debug!(session = %self.session_id, "Closed WebDriver session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    /// WebDriver endpoint whose `/url` command answers after `load_time`.
    async fn slow_loading_driver(load_time: Duration) -> String {
        let app = Router::new()
            .route(
                "/session",
                post(|| async { Json(json!({ "value": { "sessionId": "s1" } })) }),
            )
            .route(
                "/session/s1/timeouts",
                post(|| async { Json(json!({ "value": null })) }),
            )
            .route(
                "/session/s1/url",
                post(move || async move {
                    tokio::time::sleep(load_time).await;
                    Json(json!({ "value": null }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn client(webdriver_url: String, navigation: Duration, script: Duration) -> WebDriverClient {
        let browser = BrowserConfig {
            webdriver_url,
            ..BrowserConfig::default()
        };
        let session = SessionConfig {
            navigation_timeout: navigation,
            script_timeout: script,
            ..SessionConfig::default()
        };
        WebDriverClient::new(browser, session)
    }

    #[tokio::test]
    async fn test_page_load_uses_navigation_timeout() {
        let url = slow_loading_driver(Duration::from_millis(400)).await;

        let page = client(url.clone(), Duration::from_secs(5), Duration::from_millis(100))
            .open()
            .await
            .unwrap();
        page.navigate("https://slow.example.com/").await.unwrap();

        let page = client(url, Duration::from_millis(100), Duration::from_secs(5))
            .open()
            .await
            .unwrap();
        match page.navigate("https://slow.example.com/").await {
            Err(DomError::Navigation(msg)) => assert!(msg.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_codes() {
        assert!(matches!(
            map_error_code("javascript error", "x is not defined".into()),
            DomError::Script(_)
        ));
        assert!(matches!(
            map_error_code("script timeout", String::new()),
            DomError::Timeout(_)
        ));
        assert!(matches!(
            map_error_code("invalid session id", String::new()),
            DomError::Session(_)
        ));
        match map_error_code("stale element reference", "gone".into()) {
            DomError::ElementQuery(msg) => assert_eq!(msg, "stale element reference: gone"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_element_list_decoding() {
        let value = json!([{ ELEMENT_KEY: "a" }, { ELEMENT_KEY: "b" }]);
        let elements = elements_from(value).unwrap();
        assert_eq!(elements, vec![ElementHandle::new("a"), ElementHandle::new("b")]);

        assert!(elements_from(json!([{ "foo": 1 }])).is_err());
        assert!(elements_from(json!("nope")).is_err());
    }

    #[test]
    fn test_capabilities_carry_window_size() {
        let client = WebDriverClient::new(BrowserConfig::default(), SessionConfig::default());
        let caps = client.capabilities();
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(args.iter().any(|a| a == "--window-size=1920,1080"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
    }

    #[test]
    fn test_attribute_values() {
        assert_eq!(string_or_none(JsonValue::Null), None);
        assert_eq!(string_or_none(json!("0")), Some("0".to_string()));
        assert_eq!(string_or_none(json!(-1)), Some("-1".to_string()));
    }
}
