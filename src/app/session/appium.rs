use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{ElementId, Locator, Point, Rect, ScreenSize, SessionFactory, SessionOptions, UiSession};
use crate::app::capture::validate_png;
use crate::app::error::AppError;

const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// WebDriver session against an Appium server.
pub struct AppiumSession {
    client: Client,
    base_url: String,
    session_id: String,
    trace_id: String,
    closed: bool,
}

pub struct AppiumFactory {
    server_url: String,
    request_timeout: Duration,
    trace_id: String,
}

impl AppiumFactory {
    pub fn new(server_url: impl Into<String>, request_timeout: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            request_timeout,
            trace_id: trace_id.into(),
        }
    }
}

impl SessionFactory for AppiumFactory {
    fn open(&self, options: &SessionOptions) -> Result<Box<dyn UiSession>, AppError> {
        let session = AppiumSession::connect(
            &self.server_url,
            options,
            self.request_timeout,
            &self.trace_id,
        )?;
        Ok(Box::new(session))
    }
}

/// Maps a WebDriver error payload to an [`AppError`].
pub fn map_webdriver_error(value: &Value, status: u16, trace_id: &str) -> AppError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let text = format!("WebDriver {error} (HTTP {status}): {message}");
    match error {
        "no such element" | "stale element reference" => AppError::not_found(text, trace_id),
        "timeout" | "script timeout" => AppError::timeout(text, trace_id),
        "invalid argument" | "invalid selector" => AppError::validation(text, trace_id),
        _ => AppError::system(text, trace_id),
    }
}

pub fn element_id_from(value: &Value) -> Option<ElementId> {
    value
        .get(W3C_ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(|id| ElementId(id.to_string()))
}

pub fn tap_actions(point: Point, hold: Duration) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "x": point.x.round() as i64, "y": point.y.round() as i64 },
                { "type": "pointerDown", "button": 0 },
                { "type": "pause", "duration": hold.as_millis() as u64 },
                { "type": "pointerUp", "button": 0 }
            ]
        }]
    })
}

pub fn swipe_actions(from: Point, to: Point, duration: Duration) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "x": from.x.round() as i64, "y": from.y.round() as i64 },
                { "type": "pointerDown", "button": 0 },
                { "type": "pointerMove", "duration": duration.as_millis() as u64, "origin": "viewport", "x": to.x.round() as i64, "y": to.y.round() as i64 },
                { "type": "pointerUp", "button": 0 }
            ]
        }]
    })
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn parse_rect(value: &Value) -> Option<Rect> {
    Some(Rect {
        x: number(value, "x")?,
        y: number(value, "y")?,
        width: number(value, "width")?,
        height: number(value, "height")?,
    })
}

fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<&Value>,
    trace_id: &str,
) -> Result<Value, AppError> {
    let mut request = client.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request.send().map_err(|err| {
        if err.is_timeout() {
            AppError::timeout(format!("Appium request timed out: {err}"), trace_id)
        } else {
            AppError::dependency(format!("Appium server unreachable: {err}"), trace_id)
        }
    })?;
    let status = response.status();
    let payload: Value = response.json().map_err(|err| {
        AppError::system(format!("Invalid Appium response ({status}): {err}"), trace_id)
    })?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() || value.get("error").is_some() {
        return Err(map_webdriver_error(&value, status.as_u16(), trace_id));
    }
    debug!(trace_id = %trace_id, method = %method, url = %url, "webdriver ok");
    Ok(value)
}

impl AppiumSession {
    pub fn connect(
        server_url: &str,
        options: &SessionOptions,
        request_timeout: Duration,
        trace_id: &str,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| AppError::system(format!("Failed to build HTTP client: {err}"), trace_id))?;
        let base_url = server_url.trim().trim_end_matches('/').to_string();
        let body = json!({
            "capabilities": {
                "alwaysMatch": options,
                "firstMatch": [{}]
            }
        });
        let value = send(
            &client,
            Method::POST,
            &format!("{base_url}/session"),
            Some(&body),
            trace_id,
        )?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::system("Appium response has no sessionId", trace_id))?
            .to_string();
        info!(trace_id = %trace_id, session_id = %session_id, "appium session started");
        Ok(Self {
            client,
            base_url,
            session_id,
            trace_id: trace_id.to_string(),
            closed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn command(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, AppError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.client, method, &url, body, &self.trace_id)
    }

    fn locator_body(locator: &Locator) -> Value {
        json!({ "using": locator.strategy(), "value": locator.value() })
    }
}

impl UiSession for AppiumSession {
    fn screen_size(&mut self) -> Result<ScreenSize, AppError> {
        let value = self.command(Method::GET, "/window/rect", None)?;
        let rect = parse_rect(&value)
            .ok_or_else(|| AppError::system("Window rect is incomplete", &self.trace_id))?;
        Ok(ScreenSize {
            width: rect.width,
            height: rect.height,
        })
    }

    fn find_element(&mut self, locator: &Locator) -> Result<ElementId, AppError> {
        let value = self.command(Method::POST, "/element", Some(&Self::locator_body(locator)))?;
        element_id_from(&value).ok_or_else(|| {
            AppError::not_found(format!("No element for {}", locator.value()), &self.trace_id)
        })
    }

    fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementId>, AppError> {
        let value = self.command(Method::POST, "/elements", Some(&Self::locator_body(locator)))?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(element_id_from).collect())
            .unwrap_or_default())
    }

    fn element_text(&mut self, element: &ElementId) -> Result<String, AppError> {
        let value = self.command(Method::GET, &format!("/element/{}/text", element.0), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn element_rect(&mut self, element: &ElementId) -> Result<Rect, AppError> {
        let value = self.command(Method::GET, &format!("/element/{}/rect", element.0), None)?;
        parse_rect(&value)
            .ok_or_else(|| AppError::system("Element rect is incomplete", &self.trace_id))
    }

    fn tap(&mut self, point: Point, hold: Duration) -> Result<(), AppError> {
        self.command(Method::POST, "/actions", Some(&tap_actions(point, hold)))?;
        Ok(())
    }

    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), AppError> {
        self.command(Method::POST, "/actions", Some(&swipe_actions(from, to, duration)))?;
        Ok(())
    }

    fn save_screenshot(&mut self, path: &Path) -> Result<(), AppError> {
        let value = self.command(Method::GET, "/screenshot", None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| AppError::system("Screenshot payload is not a string", &self.trace_id))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| AppError::system(format!("Screenshot is not base64: {err}"), &self.trace_id))?;
        validate_png(&bytes).map_err(|message| AppError::system(message, &self.trace_id))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::system(format!("Failed to create screenshot dir: {err}"), &self.trace_id)
            })?;
        }
        fs::write(path, bytes)
            .map_err(|err| AppError::system(format!("Failed to write screenshot: {err}"), &self.trace_id))
    }

    fn quit(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None)?;
        info!(trace_id = %self.trace_id, session_id = %self.session_id, "appium session closed");
        Ok(())
    }
}

impl Drop for AppiumSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.quit() {
                warn!(trace_id = %self.trace_id, error = %err, "failed to close appium session");
            }
        }
    }
}
