//! Minimal W3C WebDriver client.
//!
//! Speaks the JSON wire protocol of chromedriver: one session per
//! collection run, deleted explicitly by the caller.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

/// Key under which W3C element references are serialized.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Interval between element lookups while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The Enter key in `send_keys` text.
pub const KEY_ENTER: &str = "\u{E007}";

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("WebDriver HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error '{error}': {message}")]
    Command { error: String, message: String },

    #[error("no element matches {0}")]
    NoSuchElement(String),

    #[error("unexpected WebDriver response: {0}")]
    Malformed(String),
}

impl WebDriverError {
    fn is_no_such_element(&self) -> bool {
        matches!(self, Self::Command { error, .. } if error == "no such element")
    }
}

/// How to find an element.
#[derive(Debug, Clone)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Css(s) => json!({ "using": "css selector", "value": s }),
            Self::XPath(s) => json!({ "using": "xpath", "value": s }),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css `{s}`"),
            Self::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

/// A reference to an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element(String);

impl Element {
    fn from_json(value: &Value) -> Result<Self, WebDriverError> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Self(id.to_string()))
            .ok_or_else(|| WebDriverError::Malformed(format!("not an element: {value}")))
    }

    /// The element as a script argument.
    pub fn as_arg(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

/// An open browser session.
pub struct WebDriverSession {
    http: Client,
    base: String,
    session_id: String,
}

impl WebDriverSession {
    /// Start a Chrome session.
    pub async fn start(webdriver_url: &str, headless: bool) -> Result<Self, WebDriverError> {
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;

        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
            "--disable-blink-features=AutomationControlled",
        ];
        if headless {
            args.push("--headless=new");
        }

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                }
            }
        });

        let base = webdriver_url.trim_end_matches('/').to_string();
        let value = call(http.post(format!("{base}/session")).json(&body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Malformed("new session without sessionId".into()))?
            .to_string();

        debug!("WebDriver session {} started", session_id);
        Ok(Self {
            http,
            base,
            session_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base, self.session_id, path)
    }

    async fn get(&self, path: &str) -> Result<Value, WebDriverError> {
        call(self.http.get(self.url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, WebDriverError> {
        call(self.http.post(self.url(path)).json(&body)).await
    }

    pub async fn goto(&self, url: &str) -> Result<(), WebDriverError> {
        self.post("/url", json!({ "url": url })).await.map(drop)
    }

    pub async fn refresh(&self) -> Result<(), WebDriverError> {
        self.post("/refresh", json!({})).await.map(drop)
    }

    pub async fn current_url(&self) -> Result<String, WebDriverError> {
        let value = self.get("/url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::Malformed("url is not a string".into()))
    }

    /// Find the first matching element, or `None`.
    pub async fn find(&self, locator: &Locator) -> Result<Option<Element>, WebDriverError> {
        match self.post("/element", locator.to_json()).await {
            Ok(value) => Element::from_json(&value).map(Some),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Find a descendant of `parent`, or `None`.
    pub async fn find_within(
        &self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Option<Element>, WebDriverError> {
        let path = format!("/element/{}/element", parent.0);
        match self.post(&path, locator.to_json()).await {
            Ok(value) => Element::from_json(&value).map(Some),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Poll for an element until `timeout` elapses.
    pub async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<Element, WebDriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(element) = self.find(locator).await? {
                return Ok(element);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(WebDriverError::NoSuchElement(locator.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// The first of several locators that appears within `timeout`.
    pub async fn wait_for_any(
        &self,
        locators: &[Locator],
        timeout: Duration,
    ) -> Result<Element, WebDriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for locator in locators {
                if let Some(element) = self.find(locator).await? {
                    return Ok(element);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                let tried: Vec<String> = locators.iter().map(ToString::to_string).collect();
                return Err(WebDriverError::NoSuchElement(tried.join(", ")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn click(&self, element: &Element) -> Result<(), WebDriverError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await
            .map(drop)
    }

    pub async fn clear(&self, element: &Element) -> Result<(), WebDriverError> {
        self.post(&format!("/element/{}/clear", element.0), json!({}))
            .await
            .map(drop)
    }

    pub async fn send_keys(&self, element: &Element, text: &str) -> Result<(), WebDriverError> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await
            .map(drop)
    }

    /// A DOM property such as `value`; `None` when unset.
    pub async fn property(&self, element: &Element, name: &str) -> Result<Option<String>, WebDriverError> {
        let value = self
            .get(&format!("/element/{}/property/{}", element.0, name))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    pub async fn text(&self, element: &Element) -> Result<String, WebDriverError> {
        let value = self.get(&format!("/element/{}/text", element.0)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Run a synchronous script and return its result.
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, WebDriverError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    pub async fn cookies(&self) -> Result<Vec<Value>, WebDriverError> {
        match self.get("/cookie").await? {
            Value::Array(cookies) => Ok(cookies),
            other => Err(WebDriverError::Malformed(format!("cookies: {other}"))),
        }
    }

    pub async fn add_cookie(&self, cookie: Value) -> Result<(), WebDriverError> {
        self.post("/cookie", json!({ "cookie": cookie })).await.map(drop)
    }

    /// End the session and close the browser.
    pub async fn delete(self) -> Result<(), WebDriverError> {
        call(self.http.delete(self.url(""))).await?;
        debug!("WebDriver session {} deleted", self.session_id);
        Ok(())
    }
}

/// Send a command and unwrap the `value` envelope.
async fn call(request: reqwest::RequestBuilder) -> Result<Value, WebDriverError> {
    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    Err(command_error(&value, status.as_u16()))
}

fn command_error(value: &Value, status: u16) -> WebDriverError {
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    WebDriverError::Command {
        error: field("error").unwrap_or_else(|| format!("HTTP {status}")),
        message: field("message").unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_reference_round_trip() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        let element = Element::from_json(&value).unwrap();
        assert_eq!(element, Element("abc-123".into()));
        assert_eq!(element.as_arg(), value);
    }

    #[test]
    fn test_element_rejects_other_shapes() {
        assert!(Element::from_json(&json!({ "ELEMENT": "x" })).is_err());
        assert!(Element::from_json(&Value::Null).is_err());
    }

    #[test]
    fn test_locator_strategies() {
        assert_eq!(
            Locator::css("#so_coll_stat").to_json(),
            json!({ "using": "css selector", "value": "#so_coll_stat" })
        );
        assert_eq!(Locator::xpath("//li").to_json()["using"], "xpath");
    }

    #[test]
    fn test_command_error_fields() {
        let err = command_error(&json!({ "error": "no such element", "message": "gone" }), 404);
        assert!(err.is_no_such_element());

        let err = command_error(&Value::Null, 500);
        assert!(matches!(err, WebDriverError::Command { ref error, .. } if error == "HTTP 500"));
        assert!(!err.is_no_such_element());
    }
}
