//! Health checks for the services a run depends on
//!
//! Each check reports a [`HealthCheckResult`] instead of failing, so the
//! `doctor` and `check-smtp` commands can print everything they learned.

use crate::adb::DeviceBridge;
use crate::config::{AppiumSettings, EmailSettings};
use crate::mailer::SmtpDelivery;
use crate::platforms::EngineConnector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Overall status of one dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is working correctly
    Healthy,
    /// Reachable, but not fully usable
    Degraded,
    /// Not reachable
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,

    /// Which dependency was checked (e.g. "adb", "appium", "smtp")
    pub component: String,

    /// Whether the dependency answered at all
    pub reachable: bool,

    /// Whether it can do the work a run needs
    pub operational: bool,

    /// Time taken to perform the health check in milliseconds
    pub check_duration_ms: u64,

    pub error_message: Option<String>,

    pub diagnostics: HashMap<String, Value>,
}

impl HealthCheckResult {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            reachable: false,
            operational: false,
            check_duration_ms: 0,
            error_message: None,
            diagnostics: HashMap::new(),
        }
    }

    /// Update the overall status based on component health
    pub fn update_status(&mut self) {
        self.status = if self.reachable && self.operational {
            HealthStatus::Healthy
        } else if self.reachable {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
    }

    pub fn add_diagnostic(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.diagnostics.insert(key.into(), json_value);
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{} check: {message}", self.component);
        self.error_message = Some(message);
    }

    fn finish(mut self, started: Instant) -> Self {
        self.check_duration_ms = started.elapsed().as_millis() as u64;
        self.update_status();
        self
    }
}

/// Restart the adb server and list devices. Healthy when at least one
/// device is in the `device` state.
pub async fn check_bridge(bridge: &DeviceBridge, reset_uiautomator2: bool) -> HealthCheckResult {
    let started = Instant::now();
    let mut result = HealthCheckResult::new("adb");
    result.add_diagnostic("path", bridge.path().display().to_string());

    match bridge.version().await {
        Ok(version) => result.add_diagnostic("version", version),
        Err(e) => {
            result.fail(e.to_string());
            return result.finish(started);
        }
    }

    if let Err(e) = bridge.restart_server().await {
        result.fail(e.to_string());
        return result.finish(started);
    }
    result.reachable = true;

    match bridge.devices().await {
        Ok(devices) => {
            result.operational = devices.iter().any(|d| d.is_ready());
            if !result.operational {
                result.fail("no device in 'device' state");
            }
            result.add_diagnostic("devices", &devices);
        }
        Err(e) => result.fail(e.to_string()),
    }

    if reset_uiautomator2 {
        let removed: HashMap<String, String> = bridge
            .reset_uiautomator2()
            .await
            .into_iter()
            .map(|(package, outcome)| {
                let outcome = match outcome {
                    Ok(()) => "uninstalled".to_string(),
                    Err(e) => e.to_string(),
                };
                (package, outcome)
            })
            .collect();
        result.add_diagnostic("uiautomator2_reset", removed);
    }

    result.finish(started)
}

/// Query the Appium server's `/status` endpoint.
pub async fn check_appium_status(settings: &AppiumSettings) -> HealthCheckResult {
    let started = Instant::now();
    let mut result = HealthCheckResult::new("appium");
    let url = format!("{}/status", settings.server_url.trim_end_matches('/'));
    result.add_diagnostic("url", &url);

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            result.fail(e.to_string());
            return result.finish(started);
        }
    };

    let body: Value = match client.get(&url).send().await {
        Ok(response) => match response.json().await {
            Ok(body) => body,
            Err(e) => {
                result.reachable = true;
                result.fail(format!("unreadable status body: {e}"));
                return result.finish(started);
            }
        },
        Err(e) => {
            result.fail(e.to_string());
            return result.finish(started);
        }
    };

    result.reachable = true;
    // Appium 2 reports ready=true; older servers omit the flag.
    result.operational = body
        .pointer("/value/ready")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    if let Some(build) = body.pointer("/value/build/version") {
        result.add_diagnostic("build", build);
    }
    if !result.operational {
        result.fail("server reports not ready");
    }
    debug!("Appium status: {body}");
    result.finish(started)
}

/// Open a throwaway session, read the foreground activity and close it.
pub async fn check_session(connector: &dyn EngineConnector) -> HealthCheckResult {
    let started = Instant::now();
    let mut result = HealthCheckResult::new("session");

    let engine = match connector.connect().await {
        Ok(engine) => engine,
        Err(e) => {
            result.fail(e.to_string());
            return result.finish(started);
        }
    };
    result.reachable = true;

    let info = engine.session_info();
    result.add_diagnostic("session", &info);

    match engine.current_activity().await {
        Ok(activity) => {
            result.operational = true;
            result.add_diagnostic("current_activity", activity);
        }
        Err(e) => result.fail(e.to_string()),
    }

    if let Err(e) = engine.quit().await {
        warn!("Failed to close test session: {e}");
    }
    result.finish(started)
}

/// Connect and authenticate against the SMTP relay.
pub async fn check_smtp(settings: &EmailSettings) -> HealthCheckResult {
    let started = Instant::now();
    let mut result = HealthCheckResult::new("smtp");
    result.add_diagnostic(
        "relay",
        format!("{}:{}", settings.smtp_server, settings.smtp_port),
    );

    match SmtpDelivery::new(settings.clone()).test_connection().await {
        Ok(true) => {
            result.reachable = true;
            result.operational = true;
        }
        Ok(false) => {
            result.reachable = true;
            result.fail("relay did not accept the connection test");
        }
        Err(e) => result.fail(e.to_string()),
    }
    result.finish(started)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_components() {
        let mut result = HealthCheckResult::new("adb");
        result.update_status();
        assert_eq!(result.status, HealthStatus::Unhealthy);

        result.reachable = true;
        result.update_status();
        assert_eq!(result.status, HealthStatus::Degraded);

        result.operational = true;
        result.update_status();
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_serialized_status_is_lowercase() {
        let mut result = HealthCheckResult::new("smtp");
        result.add_diagnostic("relay", "smtp.qq.com:465");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["diagnostics"]["relay"], "smtp.qq.com:465");
    }
}
