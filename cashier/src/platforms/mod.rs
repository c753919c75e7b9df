use crate::{AutomationError, ScreenshotResult, Selector, UIElement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod appium;

pub use appium::{AppiumConnector, AppiumEngine};

/// Details reported by the driver for an established session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub device_name: Option<String>,
    pub platform_name: Option<String>,
    pub platform_version: Option<String>,
}

/// The common trait that every device driver backend must implement
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Find all elements matching a selector, without waiting
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError>;

    /// Bring an installed app to the foreground by package id
    async fn activate_app(&self, package: &str) -> Result<(), AutomationError>;

    /// Launch a specific activity of an app
    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), AutomationError>;

    /// Press the platform back button
    async fn back(&self) -> Result<(), AutomationError>;

    /// Capture the current screen as PNG
    async fn screenshot(&self) -> Result<ScreenshotResult, AutomationError>;

    async fn current_package(&self) -> Result<String, AutomationError>;

    async fn current_activity(&self) -> Result<String, AutomationError>;

    fn session_info(&self) -> SessionInfo;

    /// End the driver session
    async fn quit(&self) -> Result<(), AutomationError>;
}

/// Establishes a driver session; the orchestrator's only fatal dependency.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AutomationEngine>, AutomationError>;
}
