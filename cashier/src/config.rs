//! Configuration for the cashier monitor.
//!
//! Settings come from an optional YAML file, then environment variables
//! override individual values. Every field has a default, so an empty file
//! (or no file at all) yields a usable configuration.
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CASHIER_APPIUM_URL` | `appium.server_url` |
//! | `CASHIER_DEVICE_NAME` | `appium.device_name` |
//! | `CASHIER_SEND_EMAIL` | `email.send_email` |
//! | `CASHIER_SMTP_PASSWORD` | `email.sender_password` |
//! | `CASHIER_SCREENSHOT_DIR` | `screenshots.directory` |
//! | `CASHIER_FLOW_DIR` | `flows.directory` |
//! | `CASHIER_ADB_PATH` | `adb.path` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_APPIUM_URL: &str = "CASHIER_APPIUM_URL";
pub const ENV_DEVICE_NAME: &str = "CASHIER_DEVICE_NAME";
pub const ENV_SEND_EMAIL: &str = "CASHIER_SEND_EMAIL";
pub const ENV_SMTP_PASSWORD: &str = "CASHIER_SMTP_PASSWORD";
pub const ENV_SCREENSHOT_DIR: &str = "CASHIER_SCREENSHOT_DIR";
pub const ENV_FLOW_DIR: &str = "CASHIER_FLOW_DIR";
pub const ENV_ADB_PATH: &str = "CASHIER_ADB_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub appium: AppiumSettings,
    pub email: EmailSettings,
    pub screenshots: ScreenshotSettings,
    pub flows: FlowSettings,
    pub timing: TimingSettings,
    pub popups: PopupSettings,
    pub adb: AdbSettings,
}

/// Appium server and session capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppiumSettings {
    pub server_url: String,
    pub platform_name: String,
    pub automation_name: String,
    /// Device serial as listed by `adb devices`
    pub device_name: String,
    pub no_reset: bool,
    pub skip_server_installation: bool,
    pub new_command_timeout_secs: u64,
    pub settings_app_launch_timeout_ms: u64,
    pub android_install_timeout_ms: u64,
    /// HTTP timeout for a single driver command
    pub request_timeout_secs: u64,
    /// Additional capabilities; unprefixed keys get the `appium:` vendor prefix
    pub extra_capabilities: Map<String, Value>,
}

impl Default for AppiumSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4723".to_string(),
            platform_name: "Android".to_string(),
            automation_name: "uiautomator2".to_string(),
            device_name: "emulator-5554".to_string(),
            no_reset: true,
            skip_server_installation: true,
            new_command_timeout_secs: 600,
            settings_app_launch_timeout_ms: 10_000,
            android_install_timeout_ms: 10_000,
            request_timeout_secs: 120,
            extra_capabilities: Map::new(),
        }
    }
}

/// SMTP delivery of the evidence archive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub send_email: bool,
    pub smtp_server: String,
    /// Implicit-TLS port
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
    pub recipient_email: String,
    /// `{timestamp}` is replaced with the run stamp
    pub subject: String,
    pub body: String,
    pub timeout_secs: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            send_email: false,
            smtp_server: "smtp.qq.com".to_string(),
            smtp_port: 465,
            sender_email: String::new(),
            sender_password: String::new(),
            recipient_email: String::new(),
            subject: "收银台监控报告 - {timestamp}".to_string(),
            body: "收银台监控截图见附件。".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotSettings {
    /// Parent of the per-run timestamped directories
    pub directory: PathBuf,
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("screenshots"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    pub directory: PathBuf,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("test_flows"),
        }
    }
}

/// Fixed pauses, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// After opening an app
    pub app_open_settle_ms: u64,
    /// After every successful step
    pub step_settle_ms: u64,
    /// Between two apps
    pub inter_app_pause_ms: u64,
    /// Poll interval of element waits
    pub wait_poll_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            app_open_settle_ms: 5_000,
            step_settle_ms: 3_000,
            inter_app_pause_ms: 3_000,
            wait_poll_ms: 500,
        }
    }
}

impl TimingSettings {
    /// All pauses zeroed, for driving test doubles.
    pub fn immediate() -> Self {
        Self {
            app_open_settle_ms: 0,
            step_settle_ms: 0,
            inter_app_pause_ms: 0,
            wait_poll_ms: 0,
        }
    }

    pub fn app_open_settle(&self) -> Duration {
        Duration::from_millis(self.app_open_settle_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn inter_app_pause(&self) -> Duration {
        Duration::from_millis(self.inter_app_pause_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupSettings {
    /// Rounds for a standalone sweep
    pub max_rounds: usize,
    /// Rounds for the sweep run between failed step attempts
    pub retry_sweep_rounds: usize,
    /// Pause after a dismissal click
    pub dismiss_settle_ms: u64,
    /// Pause after the back-button fallback
    pub back_settle_ms: u64,
    /// Pause after a quick-check dismissal
    pub quick_settle_ms: u64,
    /// Largest width/height of a control the geometric tier will click
    pub geometry_max_size: f64,
    /// Minimum x position for the geometric tier
    pub geometry_min_x: f64,
    /// Whether a round with no match ends by pressing back
    pub back_fallback: bool,
    /// Run `quick_popup_check` after every successful step
    pub quick_check_between_steps: bool,
}

impl Default for PopupSettings {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            retry_sweep_rounds: 3,
            dismiss_settle_ms: 2_000,
            back_settle_ms: 1_000,
            quick_settle_ms: 1_000,
            geometry_max_size: 100.0,
            geometry_min_x: 200.0,
            back_fallback: true,
            quick_check_between_steps: false,
        }
    }
}

impl PopupSettings {
    pub fn immediate() -> Self {
        Self {
            dismiss_settle_ms: 0,
            back_settle_ms: 0,
            quick_settle_ms: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbSettings {
    /// Explicit adb executable; searched on PATH and the SDK when unset
    pub path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Load from `path` (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Apply `CASHIER_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| env::var(var).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_APPIUM_URL) {
            self.appium.server_url = url;
        }
        if let Some(device) = lookup(ENV_DEVICE_NAME) {
            self.appium.device_name = device;
        }
        if let Some(value) = lookup(ENV_SEND_EMAIL) {
            self.email.send_email = parse_bool(&value).ok_or(ConfigError::InvalidEnv {
                var: ENV_SEND_EMAIL,
                value,
            })?;
        }
        if let Some(password) = lookup(ENV_SMTP_PASSWORD) {
            self.email.sender_password = password;
        }
        if let Some(dir) = lookup(ENV_SCREENSHOT_DIR) {
            self.screenshots.directory = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_FLOW_DIR) {
            self.flows.directory = PathBuf::from(dir);
        }
        if let Some(adb) = lookup(ENV_ADB_PATH) {
            self.adb.path = Some(PathBuf::from(adb));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.appium.server_url, "http://127.0.0.1:4723");
        assert_eq!(config.appium.automation_name, "uiautomator2");
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.flows.directory, PathBuf::from("test_flows"));
        assert_eq!(config.popups.max_rounds, 5);
        assert_eq!(config.timing.step_settle(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
appium:
  device_name: 9b7dc92d
email:
  send_email: true
  recipient_email: ops@example.com
popups:
  max_rounds: 2
"#;
        let config = MonitorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.appium.device_name, "9b7dc92d");
        assert_eq!(config.appium.server_url, "http://127.0.0.1:4723");
        assert!(config.email.send_email);
        assert_eq!(config.email.smtp_server, "smtp.qq.com");
        assert_eq!(config.popups.max_rounds, 2);
        assert!(config.popups.back_fallback);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = MonitorConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.timing.inter_app_pause_ms, 3_000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_APPIUM_URL, "http://10.0.0.2:4723"),
            (ENV_SEND_EMAIL, "yes"),
            (ENV_SMTP_PASSWORD, "secret"),
            (ENV_FLOW_DIR, "/srv/flows"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        config
            .apply_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.appium.server_url, "http://10.0.0.2:4723");
        assert!(config.email.send_email);
        assert_eq!(config.email.sender_password, "secret");
        assert_eq!(config.flows.directory, PathBuf::from("/srv/flows"));
    }

    #[test]
    fn test_invalid_bool_env_is_rejected() {
        let mut config = MonitorConfig::default();
        let result = config.apply_overrides(|var| {
            (var == ENV_SEND_EMAIL).then(|| "maybe".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { var: ENV_SEND_EMAIL, .. })
        ));
    }
}
