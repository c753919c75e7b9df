//! Appium (W3C WebDriver) backend
//!
//! Talks to an Appium server over HTTP. Element lookups, element commands and
//! navigation use the plain W3C endpoints; Android specific commands
//! (activate app, start activity, current package) go through
//! `mobile:` execute-script extensions supported by the UiAutomator2 driver.

use crate::config::AppiumSettings;
use crate::element::{Bounds, UIElementImpl};
use crate::platforms::{AutomationEngine, EngineConnector, SessionInfo};
use crate::{AutomationError, ScreenshotResult, Selector, UIElement};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// W3C web element identifier key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// JSONWP element key still emitted by some drivers
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

#[derive(Clone)]
struct WebDriverClient {
    http: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn get(&self, path: &str) -> Result<Value, AutomationError> {
        send(self.http.get(self.session_url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AutomationError> {
        send(self.http.post(self.session_url(path)).json(&body)).await
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value, AutomationError> {
        self.post(
            "/execute/sync",
            json!({ "script": script, "args": [args] }),
        )
        .await
    }

    async fn find(
        &self,
        scope: &str,
        selector: &Selector,
    ) -> Result<Vec<UIElement>, AutomationError> {
        let (using, value) = selector.to_webdriver();
        let found = self
            .post(
                &format!("{scope}/elements"),
                json!({ "using": using, "value": value }),
            )
            .await?;
        Ok(parse_element_ids(&found)
            .into_iter()
            .map(|id| {
                UIElement::new(Box::new(AppiumElement {
                    client: self.clone(),
                    id,
                }))
            })
            .collect())
    }
}

/// Send a request and unwrap the W3C `{"value": ...}` envelope.
async fn send(request: RequestBuilder) -> Result<Value, AutomationError> {
    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await.map_err(|e| {
        AutomationError::PlatformError(format!("Malformed response from Appium ({status}): {e}"))
    })?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() || value.get("error").is_some() {
        return Err(map_webdriver_error(&value));
    }
    Ok(value)
}

/// Map a W3C error payload to a typed error.
pub fn map_webdriver_error(value: &Value) -> AutomationError {
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match code.as_str() {
        "no such element" => AutomationError::ElementNotFound(message),
        "stale element reference" => AutomationError::ElementDetached(message),
        "element not interactable" => AutomationError::ElementNotVisible(message),
        "timeout" | "script timeout" => AutomationError::Timeout(message),
        "invalid selector" => AutomationError::InvalidSelector(message),
        "invalid session id" | "session not created" => AutomationError::SessionError(message),
        "unknown method" | "unknown command" | "unsupported operation" => {
            AutomationError::UnsupportedOperation(message)
        }
        _ => AutomationError::WebDriver { code, message },
    }
}

/// Extract element references from a find-elements response.
pub fn parse_element_ids(value: &Value) -> Vec<String> {
    let refs = match value {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };
    refs.into_iter()
        .filter_map(|item| {
            item.get(ELEMENT_KEY)
                .or_else(|| item.get(LEGACY_ELEMENT_KEY))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

/// Build the `capabilities` payload for a new-session request.
pub fn build_capabilities(settings: &AppiumSettings) -> Value {
    let mut always = Map::new();
    always.insert("platformName".into(), json!(settings.platform_name));
    always.insert("appium:automationName".into(), json!(settings.automation_name));
    always.insert("appium:deviceName".into(), json!(settings.device_name));
    always.insert("appium:noReset".into(), json!(settings.no_reset));
    always.insert(
        "appium:skipServerInstallation".into(),
        json!(settings.skip_server_installation),
    );
    always.insert(
        "appium:newCommandTimeout".into(),
        json!(settings.new_command_timeout_secs),
    );
    always.insert(
        "appium:settingsAppLaunchTimeout".into(),
        json!(settings.settings_app_launch_timeout_ms),
    );
    always.insert(
        "appium:androidInstallTimeout".into(),
        json!(settings.android_install_timeout_ms),
    );
    for (key, value) in &settings.extra_capabilities {
        let key = if key.contains(':') || key == "platformName" {
            key.clone()
        } else {
            format!("appium:{key}")
        };
        always.insert(key, value.clone());
    }

    json!({
        "capabilities": {
            "alwaysMatch": Value::Object(always),
            "firstMatch": [{}]
        }
    })
}

fn session_info_from(value: &Value) -> Result<SessionInfo, AutomationError> {
    let session_id = value
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AutomationError::SessionError(format!("New-session response lacks sessionId: {value}"))
        })?
        .to_string();
    let caps = value.get("capabilities").cloned().unwrap_or(Value::Null);
    let cap = |name: &str| {
        caps.get(name)
            .or_else(|| caps.get(format!("appium:{name}")))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Ok(SessionInfo {
        session_id,
        device_name: cap("deviceName"),
        platform_name: cap("platformName"),
        platform_version: cap("platformVersion"),
    })
}

/// A live session on an Appium server
pub struct AppiumEngine {
    client: WebDriverClient,
    info: SessionInfo,
}

impl AppiumEngine {
    /// Open a new session with the configured capabilities.
    #[instrument(skip(settings), fields(server = %settings.server_url))]
    pub async fn connect(settings: &AppiumSettings) -> Result<Self, AutomationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        let base_url = settings.server_url.trim_end_matches('/').to_string();

        let value = send(
            http.post(format!("{base_url}/session"))
                .json(&build_capabilities(settings)),
        )
        .await
        .map_err(|e| AutomationError::SessionError(format!("Could not create session: {e}")))?;
        let info = session_info_from(&value)?;

        info!(
            session_id = %info.session_id,
            device = ?info.device_name,
            "Appium session established"
        );

        Ok(Self {
            client: WebDriverClient {
                http,
                base_url,
                session_id: info.session_id.clone(),
            },
            info,
        })
    }
}

#[async_trait]
impl AutomationEngine for AppiumEngine {
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError> {
        debug!(%selector, "find_elements");
        self.client.find("", selector).await
    }

    async fn activate_app(&self, package: &str) -> Result<(), AutomationError> {
        self.client
            .execute("mobile: activateApp", json!({ "appId": package }))
            .await?;
        Ok(())
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), AutomationError> {
        self.client
            .execute(
                "mobile: startActivity",
                json!({ "component": format!("{package}/{activity}") }),
            )
            .await?;
        Ok(())
    }

    async fn back(&self) -> Result<(), AutomationError> {
        self.client.post("/back", json!({})).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<ScreenshotResult, AutomationError> {
        let value = self.client.get("/screenshot").await?;
        let encoded = value.as_str().ok_or_else(|| {
            AutomationError::PlatformError("Screenshot response is not a string".to_string())
        })?;
        let image_data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AutomationError::PlatformError(format!("Invalid screenshot data: {e}")))?;
        Ok(ScreenshotResult { image_data })
    }

    async fn current_package(&self) -> Result<String, AutomationError> {
        let value = self
            .client
            .execute("mobile: getCurrentPackage", json!({}))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_activity(&self) -> Result<String, AutomationError> {
        let value = self
            .client
            .execute("mobile: getCurrentActivity", json!({}))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn session_info(&self) -> SessionInfo {
        self.info.clone()
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        send(self.client.http.delete(self.client.session_url(""))).await?;
        info!(session_id = %self.info.session_id, "Appium session closed");
        Ok(())
    }
}

#[derive(Clone)]
struct AppiumElement {
    client: WebDriverClient,
    id: String,
}

impl std::fmt::Debug for AppiumElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppiumElement").field("id", &self.id).finish()
    }
}

impl AppiumElement {
    fn path(&self, suffix: &str) -> String {
        format!("/element/{}{}", self.id, suffix)
    }
}

#[async_trait]
impl UIElementImpl for AppiumElement {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn text(&self) -> Result<String, AutomationError> {
        let value = self.client.get(&self.path("/text")).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_enabled(&self) -> Result<bool, AutomationError> {
        let value = self.client.get(&self.path("/enabled")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_displayed(&self) -> Result<bool, AutomationError> {
        let value = self.client.get(&self.path("/displayed")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn bounds(&self) -> Result<Bounds, AutomationError> {
        let value = self.client.get(&self.path("/rect")).await?;
        serde_json::from_value(value)
            .map_err(|e| AutomationError::PlatformError(format!("Invalid element rect: {e}")))
    }

    async fn click(&self) -> Result<(), AutomationError> {
        self.client.post(&self.path("/click"), json!({})).await?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.client
            .post(&self.path("/value"), json!({ "text": text, "value": chars }))
            .await?;
        Ok(())
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError> {
        self.client.find(&self.path(""), selector).await
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(self.clone())
    }
}

/// Opens Appium sessions from configuration
pub struct AppiumConnector {
    settings: AppiumSettings,
}

impl AppiumConnector {
    pub fn new(settings: AppiumSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl EngineConnector for AppiumConnector {
    async fn connect(&self) -> Result<Arc<dyn AutomationEngine>, AutomationError> {
        match AppiumEngine::connect(&self.settings).await {
            Ok(engine) => Ok(Arc::new(engine)),
            Err(e) => {
                warn!("Appium driver initialization failed: {}", e);
                Err(e)
            }
        }
    }
}
