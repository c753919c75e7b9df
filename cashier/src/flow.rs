//! Declarative per-app flow files
//!
//! A flow file (JSON or YAML) names one app and the ordered steps that lead
//! to its cashier screen:
//!
//! ```json
//! {
//!   "appName": "WeChat",
//!   "appPackage": "com.tencent.mm",
//!   "steps": [
//!     {"action": "click", "locatorType": "XPATH", "locatorValue": "//*[@text='我']",
//!      "description": "open profile tab"},
//!     {"action": "wait", "locatorType": "ID", "locatorValue": "com.tencent.mm:id/pay",
//!      "description": "wallet entry", "timeout": 15, "mandatory": false}
//!   ]
//! }
//! ```

use crate::selector::{LocatorStrategy, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STEP_TIMEOUT_SECS: f64 = 10.0;
/// Longest wait a single step may ask for.
pub const MAX_STEP_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const FLOW_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Flow directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed flow file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Unsupported flow file extension: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Unknown locator type '{tag}' in step '{step}'")]
    UnknownLocator { tag: String, step: String },

    #[error("Step '{0}' sends keys but has no inputText")]
    MissingInputText(String),
}

/// What a step does once its element is located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Wait until clickable, then click
    Click,
    /// Wait until visible, then type `inputText`
    SendKeys,
    /// Wait until present
    Wait,
}

/// One target app and the steps that reach its cashier screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDescriptor {
    pub app_name: String,
    pub app_package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_activity: Option<String>,
    pub steps: Vec<StepDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub action: ActionKind,
    /// Kept verbatim; resolved when the step first runs
    pub locator_type: String,
    pub locator_value: String,
    pub description: String,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
}

fn default_timeout() -> f64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

fn default_mandatory() -> bool {
    true
}

impl StepDescriptor {
    pub fn resolve_selector(&self) -> Result<Selector, FlowError> {
        let strategy: LocatorStrategy =
            self.locator_type
                .parse()
                .map_err(|_| FlowError::UnknownLocator {
                    tag: self.locator_type.clone(),
                    step: self.description.clone(),
                })?;
        Ok(Selector::new(strategy, self.locator_value.clone()))
    }

    /// Text to type for `send_keys`.
    pub fn required_input(&self) -> Result<&str, FlowError> {
        self.input_text
            .as_deref()
            .ok_or_else(|| FlowError::MissingInputText(self.description.clone()))
    }

    /// The wait budget. Negative values clamp to zero, NaN falls back to the
    /// default and anything above [`MAX_STEP_TIMEOUT`] is capped.
    pub fn timeout(&self) -> Duration {
        if self.timeout.is_nan() {
            return Duration::from_secs_f64(DEFAULT_STEP_TIMEOUT_SECS);
        }
        Duration::try_from_secs_f64(self.timeout.max(0.0))
            .map_or(MAX_STEP_TIMEOUT, |timeout| timeout.min(MAX_STEP_TIMEOUT))
    }

    /// Configuration problems that would fail this step before touching a device.
    pub fn problems(&self) -> Vec<FlowError> {
        let mut problems = Vec::new();
        if let Err(e) = self.resolve_selector() {
            problems.push(e);
        }
        if self.action == ActionKind::SendKeys {
            if let Err(e) = self.required_input() {
                problems.push(e);
            }
        }
        problems
    }
}

impl FlowDescriptor {
    /// Load a single flow file, choosing the parser by extension.
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let text = std::fs::read_to_string(path).map_err(|source| FlowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let malformed = |message: String| FlowError::Malformed {
            path: path.to_path_buf(),
            message,
        };
        match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&text).map_err(|e| malformed(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| malformed(e.to_string()))
            }
            _ => Err(FlowError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn problems(&self) -> Vec<FlowError> {
        self.steps.iter().flat_map(|s| s.problems()).collect()
    }
}

/// A flow file found on disk, parsed or not.
#[derive(Debug)]
pub struct FlowSource {
    pub path: PathBuf,
    /// File name without extension; names the outcome when parsing fails
    pub stem: String,
    pub flow: Result<FlowDescriptor, FlowError>,
}

impl FlowSource {
    /// Display name: the flow's app name, or the file stem if it did not parse.
    pub fn name(&self) -> &str {
        match &self.flow {
            Ok(flow) => &flow.app_name,
            Err(_) => &self.stem,
        }
    }
}

/// Every flow file in `dir`, sorted by file name.
pub fn load_dir(dir: &Path) -> Result<Vec<FlowSource>, FlowError> {
    if !dir.is_dir() {
        return Err(FlowError::MissingDirectory(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|source| FlowError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FlowError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let wanted = extension(&path).is_some_and(|ext| FLOW_EXTENSIONS.contains(&ext.as_str()));
        if path.is_file() && wanted {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(paths
        .into_iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let flow = FlowDescriptor::load(&path);
            FlowSource { path, stem, flow }
        })
        .collect())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const WECHAT: &str = r#"{
        "appName": "WeChat",
        "appPackage": "com.tencent.mm",
        "steps": [
            {"action": "click", "locatorType": "XPATH", "locatorValue": "//*[@text='我']", "description": "profile"},
            {"action": "send_keys", "locatorType": "id", "locatorValue": "search", "description": "search box",
             "inputText": "pay", "timeout": 2.5, "mandatory": false}
        ]
    }"#;

    #[test]
    fn test_defaults_applied() {
        let flow: FlowDescriptor = serde_json::from_str(WECHAT).unwrap();
        assert_eq!(flow.app_activity, None);
        let first = &flow.steps[0];
        assert_eq!(first.action, ActionKind::Click);
        assert!(first.mandatory);
        assert_eq!(first.timeout(), Duration::from_secs(10));
        assert!(first.input_text.is_none());

        let second = &flow.steps[1];
        assert_eq!(second.action, ActionKind::SendKeys);
        assert!(!second.mandatory);
        assert_eq!(second.timeout(), Duration::from_millis(2500));
        assert_eq!(second.required_input().unwrap(), "pay");
    }

    #[test]
    fn test_locator_resolution_is_case_insensitive() {
        let flow: FlowDescriptor = serde_json::from_str(WECHAT).unwrap();
        let selector = flow.steps[1].resolve_selector().unwrap();
        assert_eq!(selector, Selector::Id("search".to_string()));
    }

    #[test]
    fn test_unknown_action_rejected_at_load() {
        let text = r#"{"appName": "A", "appPackage": "a", "steps": [
            {"action": "swipe", "locatorType": "ID", "locatorValue": "x", "description": "d"}]}"#;
        assert!(serde_json::from_str::<FlowDescriptor>(text).is_err());
    }

    #[test]
    fn test_unknown_locator_reported_as_problem() {
        let step = StepDescriptor {
            action: ActionKind::SendKeys,
            locator_type: "CSS".to_string(),
            locator_value: "#pay".to_string(),
            description: "pay button".to_string(),
            timeout: -1.0,
            input_text: None,
            mandatory: true,
        };
        let problems = step.problems();
        assert_eq!(problems.len(), 2);
        assert!(matches!(&problems[0], FlowError::UnknownLocator { tag, .. } if tag == "CSS"));
        assert!(matches!(&problems[1], FlowError::MissingInputText(_)));
        assert_eq!(step.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_huge_timeout_capped() {
        let text = r#"{"action": "wait", "locatorType": "ID", "locatorValue": "pay",
            "description": "pay", "timeout": 1e19}"#;
        let step: StepDescriptor = serde_json::from_str(text).unwrap();
        assert_eq!(step.timeout(), MAX_STEP_TIMEOUT);

        let endless = StepDescriptor {
            timeout: f64::INFINITY,
            ..step.clone()
        };
        assert_eq!(endless.timeout(), MAX_STEP_TIMEOUT);

        let nan = StepDescriptor {
            timeout: f64::NAN,
            ..step
        };
        assert_eq!(nan.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_dir_sorted_and_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_wechat.json"), WECHAT).unwrap();
        fs::write(
            dir.path().join("a_meituan.yaml"),
            "appName: Meituan\nappPackage: com.sankuai.meituan\nsteps: []\n",
        )
        .unwrap();
        fs::write(dir.path().join("c_broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sources = load_dir(dir.path()).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Meituan", "WeChat", "c_broken"]);
        assert!(matches!(sources[2].flow, Err(FlowError::Malformed { .. })));
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_dir(&missing),
            Err(FlowError::MissingDirectory(_))
        ));
    }
}
