//! W3C WebDriver implementation of the browser session seam.
//!
//! Talks JSON-over-HTTP to a locally running driver (chromedriver by
//! default). Only the handful of commands the login engine needs are
//! implemented; waits are client-side polls with explicit deadlines.

use std::path::Path;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use keepauth_browser::{
    BrowserError, BrowserOptions, ElementSnapshot, Key, Locator, LocatorKind, PageSession,
    SessionFactory, WaitCondition, WaitMatch, WaitSpec,
};

/// Poll cadence for client-side waits.
const WAIT_POLL: Duration = Duration::from_millis(500);

/// Container tags probed for text-based locators.
const TEXT_TAGS: [&str; 2] = ["pre", "body"];

/// Opens WebDriver sessions against a configured driver endpoint.
pub struct WebDriverFactory {
    webdriver_url: String,
    options: BrowserOptions,
}

impl WebDriverFactory {
    #[must_use]
    pub fn new(webdriver_url: impl Into<String>, options: BrowserOptions) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            options,
        }
    }
}

impl SessionFactory for WebDriverFactory {
    fn open(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        let session = WebDriverSession::open(&self.webdriver_url, &self.options)?;
        Ok(Box::new(session))
    }
}

struct WebDriverSession {
    http: reqwest::blocking::Client,
    /// `{driver}/session/{id}`
    session_url: String,
    page_load_timeout: Duration,
    closed: bool,
}

impl WebDriverSession {
    fn open(webdriver_url: &str, options: &BrowserOptions) -> Result<Self, BrowserError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(options.page_load_timeout + Duration::from_secs(30))
            .build()
            .map_err(|err| BrowserError::Driver(err.to_string()))?;

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--ignore-certificate-errors".to_string(),
            "--disable-extensions".to_string(),
            "--dns-prefetch-disable".to_string(),
            format!("--force-device-scale-factor={}", options.ui_scaling),
        ];
        if options.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }
        if options.incognito {
            // lets the 2FA method be selected fresh on every login
            args.push("--incognito".to_string());
        }
        if let Some(dir) = &options.user_data_dir {
            args.push(format!("--user-data-dir={dir}"));
        }

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": { "args": args },
                }
            }
        });

        let response = http
            .post(format!("{webdriver_url}/session"))
            .json(&body)
            .send()
            .map_err(|err| BrowserError::Driver(format!("cannot reach the webdriver: {err}")))?;
        let value = unwrap_value(response)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Driver("webdriver returned no session id".to_string()))?;

        let session = Self {
            http,
            session_url: format!("{webdriver_url}/session/{session_id}"),
            page_load_timeout: options.page_load_timeout,
            closed: false,
        };

        session.command(
            reqwest::Method::POST,
            "timeouts",
            Some(json!({ "pageLoad": options.page_load_timeout.as_millis() as u64 })),
        )?;

        Ok(session)
    }

    /// Issue one WebDriver command and unwrap its `value` envelope.
    fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = if path.is_empty() {
            self.session_url.clone()
        } else {
            format!("{}/{path}", self.session_url)
        };

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        } else {
            // the W3C protocol requires a JSON body on every POST
            request = request.json(&json!({}));
        }
        let response = request
            .send()
            .map_err(|err| BrowserError::Driver(err.to_string()))?;
        unwrap_value(response)
    }

    fn find_element(&self, using: &str, value: &str) -> Result<String, BrowserError> {
        let result = self.command(
            reqwest::Method::POST,
            "element",
            Some(json!({ "using": using, "value": value })),
        )?;
        element_id(&result)
            .ok_or_else(|| BrowserError::Driver(format!("no element reference in: {result}")))
    }

    /// Resolve a locator to an element id, if one currently matches.
    fn resolve(&self, locator: &Locator) -> Result<Option<String>, BrowserError> {
        match locator.kind {
            LocatorKind::TagText => {
                for tag in TEXT_TAGS {
                    let Ok(id) = self.find_element("tag name", tag) else {
                        continue;
                    };
                    let text = self.element_text(&id)?;
                    if text.contains(&locator.identifier) {
                        return Ok(Some(id));
                    }
                }
                Ok(None)
            }
            _ => {
                let selector = css_selector(locator);
                match self.find_element("css selector", &selector) {
                    Ok(id) => Ok(Some(id)),
                    Err(_) => Ok(None),
                }
            }
        }
    }

    fn element_text(&self, element: &str) -> Result<String, BrowserError> {
        let value = self.command(reqwest::Method::GET, &format!("element/{element}/text"), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn element_attribute(&self, element: &str, name: &str) -> Result<Option<String>, BrowserError> {
        let value = self.command(
            reqwest::Method::GET,
            &format!("element/{element}/attribute/{name}"),
            None,
        )?;
        Ok(value.as_str().map(str::to_string))
    }

    fn element_flag(&self, element: &str, check: &str) -> bool {
        self.command(reqwest::Method::GET, &format!("element/{element}/{check}"), None)
            .ok()
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn snapshot(&self, element: &str) -> Result<ElementSnapshot, BrowserError> {
        Ok(ElementSnapshot {
            id: self.element_attribute(element, "id")?,
            class: self.element_attribute(element, "class")?,
            name: self.element_attribute(element, "name")?,
            text: self.element_text(element)?,
        })
    }

    /// Whether a spec currently holds; returns the element id on match.
    fn spec_matches(&self, spec: &WaitSpec) -> Result<Option<String>, BrowserError> {
        let Some(element) = self.resolve(&spec.locator)? else {
            return Ok(None);
        };
        let holds = match &spec.condition {
            WaitCondition::Visible => self.element_flag(&element, "displayed"),
            WaitCondition::Clickable => {
                self.element_flag(&element, "displayed") && self.element_flag(&element, "enabled")
            }
            WaitCondition::HasText(text) => self.element_text(&element)?.contains(text),
        };
        Ok(holds.then_some(element))
    }

    fn required_element(&self, locator: &Locator) -> Result<String, BrowserError> {
        self.resolve(locator)?
            .ok_or_else(|| BrowserError::Driver(format!("element not found: {locator}")))
    }
}

impl PageSession for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        match self.command(reqwest::Method::POST, "url", Some(json!({ "url": url }))) {
            Ok(_) => Ok(()),
            Err(BrowserError::Driver(message)) => {
                if message.contains("ERR_CONNECTION_REFUSED") {
                    Err(BrowserError::ConnectionRefused(message))
                } else if message.contains("ERR_CONNECTION_CLOSED") {
                    Err(BrowserError::ConnectionClosed(message))
                } else if message.contains("timeout") {
                    Err(BrowserError::PageLoadTimeout {
                        url: url.to_string(),
                        timeout: self.page_load_timeout,
                    })
                } else {
                    Err(BrowserError::Driver(message))
                }
            }
            Err(other) => Err(other),
        }
    }

    fn refresh(&mut self) -> Result<(), BrowserError> {
        self.command(reqwest::Method::POST, "refresh", None)?;
        Ok(())
    }

    fn wait_any(
        &mut self,
        specs: &[WaitSpec],
        timeout: Duration,
    ) -> Result<WaitMatch, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            for (index, spec) in specs.iter().enumerate() {
                if let Some(element) = self.spec_matches(spec)? {
                    return Ok(WaitMatch {
                        index,
                        element: self.snapshot(&element)?,
                    });
                }
            }
            if Instant::now() >= deadline {
                let waiting_for = specs
                    .iter()
                    .map(|spec| spec.locator.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(BrowserError::WaitTimeout {
                    waiting_for,
                    timeout,
                });
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    fn wait_present(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.resolve(locator)?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::WaitTimeout {
                    waiting_for: locator.to_string(),
                    timeout,
                });
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    fn clear_and_type(&mut self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let element = self.required_element(locator)?;
        self.command(reqwest::Method::POST, &format!("element/{element}/clear"), None)?;
        self.command(
            reqwest::Method::POST,
            &format!("element/{element}/value"),
            Some(json!({ "text": text })),
        )?;
        Ok(())
    }

    fn press(&mut self, locator: &Locator, key: Key) -> Result<(), BrowserError> {
        let element = self.required_element(locator)?;
        let sequence = match key {
            Key::Tab => "\u{e004}",
            Key::Enter => "\u{e007}",
        };
        self.command(
            reqwest::Method::POST,
            &format!("element/{element}/value"),
            Some(json!({ "text": sequence })),
        )?;
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> Result<(), BrowserError> {
        let element = self.required_element(locator)?;
        self.command(reqwest::Method::POST, &format!("element/{element}/click"), None)?;
        Ok(())
    }

    fn select_by_visible_text(&mut self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let select = self.required_element(locator)?;
        let options = self.command(
            reqwest::Method::POST,
            &format!("element/{select}/elements"),
            Some(json!({ "using": "tag name", "value": "option" })),
        )?;
        let options = options.as_array().cloned().unwrap_or_default();

        for option in &options {
            let Some(option_id) = element_id(option) else {
                continue;
            };
            if self.element_text(&option_id)?.trim() == text {
                self.command(
                    reqwest::Method::POST,
                    &format!("element/{option_id}/click"),
                    None,
                )?;
                return Ok(());
            }
        }
        Err(BrowserError::Driver(format!(
            "no option with visible text \"{text}\" in {locator}"
        )))
    }

    fn read_text(&mut self, locator: &Locator) -> Result<String, BrowserError> {
        let element = self.required_element(locator)?;
        self.element_text(&element)
    }

    fn save_screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        let value = self.command(reqwest::Method::GET, "screenshot", None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Driver("screenshot response was not a string".to_string()))?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|err| BrowserError::Driver(format!("invalid screenshot payload: {err}")))?;
        std::fs::write(path, bytes)
            .map_err(|err| BrowserError::Driver(format!("cannot write screenshot: {err}")))?;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let url = self.session_url.clone();
        if let Err(err) = self.http.delete(url).send() {
            tracing::debug!("failed to delete the webdriver session: {err}");
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Unwrap the W3C `{"value": ...}` envelope, turning protocol errors
/// into driver errors carrying the upstream message.
fn unwrap_value(response: reqwest::blocking::Response) -> Result<Value, BrowserError> {
    let code = response.status();
    let body: Value = response
        .json()
        .map_err(|err| BrowserError::Driver(format!("malformed webdriver response: {err}")))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if code.is_success() {
        return Ok(value);
    }

    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Err(BrowserError::Driver(format!("{error}: {message}")))
}

/// The element reference key defined by the W3C protocol.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Map a locator to a CSS selector (text locators are handled separately).
fn css_selector(locator: &Locator) -> String {
    match locator.kind {
        LocatorKind::Id => format!("[id='{}']", locator.identifier),
        LocatorKind::Name => format!("[name='{}']", locator.identifier),
        LocatorKind::Class => {
            let classes = locator
                .identifier
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(".");
            format!(".{classes}")
        }
        LocatorKind::Css => locator.identifier.clone(),
        LocatorKind::TagText => locator.identifier.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locators_map_to_css_selectors() {
        assert_eq!(
            css_selector(&Locator::new(LocatorKind::Id, "chlginput")),
            "[id='chlginput']"
        );
        assert_eq!(
            css_selector(&Locator::new(LocatorKind::Name, "username")),
            "[name='username']"
        );
        assert_eq!(
            css_selector(&Locator::new(LocatorKind::Class, "alert alert-danger")),
            ".alert.alert-danger"
        );
        assert_eq!(
            css_selector(&Locator::new(LocatorKind::Css, ".btn.btn-lg")),
            ".btn.btn-lg"
        );
    }

    #[test]
    fn element_reference_unwraps() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        assert_eq!(element_id(&value).as_deref(), Some("abc-123"));
        assert_eq!(element_id(&json!({})), None);
    }
}
