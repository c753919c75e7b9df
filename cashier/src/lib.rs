//! Cashier-screen monitoring for Android apps driven through Appium
//!
//! A run opens one driver session, walks each configured app to its payment
//! screen by interpreting a declarative flow file, clears unexpected popups
//! along the way, screenshots the result and ships the evidence as a zip by
//! email.

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub mod adb;
pub mod archive;
pub mod config;
pub mod element;
pub mod errors;
pub mod evidence;
pub mod executor;
pub mod flow;
pub mod health;
pub mod locator;
pub mod mailer;
pub mod monitor;
pub mod platforms;
pub mod popup;
pub mod probe;
pub mod selector;

pub use config::MonitorConfig;
pub use element::{Bounds, UIElement, UIElementImpl};
pub use errors::AutomationError;
pub use executor::{FlowExecutor, FlowReport, StepError};
pub use flow::{ActionKind, FlowDescriptor, FlowError, StepDescriptor};
pub use locator::{Locator, WaitCondition};
pub use monitor::{Monitor, MonitorError, RunOutcome, RunSummary};
pub use platforms::{AutomationEngine, EngineConnector, SessionInfo};
pub use popup::{PopupCandidate, PopupHandler, PopupSweep, PopupTier};
pub use selector::{LocatorStrategy, Selector};

/// Holds the screenshot image data
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    /// Encoded PNG bytes as returned by the driver
    pub image_data: Vec<u8>,
}

/// Handle to one driver session.
///
/// Cloning is cheap; every clone talks to the same session.
#[derive(Clone)]
pub struct Device {
    engine: Arc<dyn AutomationEngine>,
    poll_interval: Duration,
}

impl Device {
    pub fn new(engine: Arc<dyn AutomationEngine>) -> Self {
        Self {
            engine,
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Poll interval handed to every locator this device creates.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.engine.clone(), selector.into()).set_poll_interval(self.poll_interval)
    }

    pub async fn find_elements(
        &self,
        selector: &Selector,
    ) -> Result<Vec<UIElement>, AutomationError> {
        self.engine.find_elements(selector).await
    }

    #[instrument(skip(self))]
    pub async fn activate_app(&self, package: &str) -> Result<(), AutomationError> {
        self.engine.activate_app(package).await
    }

    /// Open an app, through its activity when one is known.
    #[instrument(skip(self))]
    pub async fn open_app(
        &self,
        package: &str,
        activity: Option<&str>,
    ) -> Result<(), AutomationError> {
        match activity {
            Some(activity) => self.engine.start_activity(package, activity).await,
            None => self.engine.activate_app(package).await,
        }
    }

    pub async fn back(&self) -> Result<(), AutomationError> {
        self.engine.back().await
    }

    #[instrument(skip(self))]
    pub async fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        self.engine.screenshot().await
    }

    pub async fn current_package(&self) -> Result<String, AutomationError> {
        self.engine.current_package().await
    }

    pub async fn current_activity(&self) -> Result<String, AutomationError> {
        self.engine.current_activity().await
    }

    pub fn session_info(&self) -> SessionInfo {
        self.engine.session_info()
    }

    #[instrument(skip(self))]
    pub async fn quit(&self) -> Result<(), AutomationError> {
        self.engine.quit().await
    }
}
