//! Scripted in-memory device shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use cashier::element::UIElementImpl;
use cashier::mailer::{Delivery, DeliveryError};
use cashier::{
    AutomationEngine, AutomationError, Bounds, EngineConnector, ScreenshotResult, Selector,
    SessionInfo, UIElement,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Everything the fake device was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ActivateApp(String),
    StartActivity(String, String),
    Find(Selector),
    FindIn(String, Selector),
    Click(String),
    SendKeys(String, String),
    Back,
    Screenshot,
    Quit,
}

#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub id: String,
    pub text: String,
    pub bounds: Bounds,
    pub displayed: bool,
    pub enabled: bool,
    pub click_fails: bool,
    pub children: Vec<(Selector, ElementSpec)>,
}

impl ElementSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            text: String::new(),
            bounds: Bounds::new(0.0, 0.0, 300.0, 80.0),
            displayed: true,
            enabled: true,
            click_fails: false,
            children: Vec::new(),
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn bounds(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounds = Bounds::new(x, y, width, height);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn failing_click(mut self) -> Self {
        self.click_fails = true;
        self
    }

    pub fn child(mut self, selector: Selector, spec: ElementSpec) -> Self {
        self.children.push((selector, spec));
        self
    }
}

#[derive(Default)]
struct FakeState {
    screen: HashMap<Selector, Vec<ElementSpec>>,
    log: Vec<Command>,
    fail_finds: bool,
    fail_back: bool,
    fail_open: HashSet<String>,
}

/// Matches selectors by equality against a registered screen
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, selector: Selector, spec: ElementSpec) -> Self {
        self.state
            .lock()
            .unwrap()
            .screen
            .entry(selector)
            .or_default()
            .push(spec);
        self
    }

    /// Every lookup errors, at top level and inside containers.
    pub fn failing_finds(self) -> Self {
        self.state.lock().unwrap().fail_finds = true;
        self
    }

    pub fn failing_back(self) -> Self {
        self.state.lock().unwrap().fail_back = true;
        self
    }

    pub fn failing_open(self, package: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_open
            .insert(package.to_string());
        self
    }

    pub fn engine(&self) -> Arc<dyn AutomationEngine> {
        Arc::new(self.clone())
    }

    pub fn device(&self) -> cashier::Device {
        cashier::Device::new(self.engine())
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().unwrap().log.clone()
    }

    /// Commands other than lookups.
    pub fn actions(&self) -> Vec<Command> {
        self.commands()
            .into_iter()
            .filter(|c| !matches!(c, Command::Find(_) | Command::FindIn(_, _)))
            .collect()
    }

    pub fn count(&self, wanted: &Command) -> usize {
        self.commands().iter().filter(|c| *c == wanted).count()
    }

    pub fn searched(&self, selector: &Selector) -> bool {
        self.commands()
            .iter()
            .any(|c| matches!(c, Command::Find(s) if s == selector))
    }

    fn record(&self, command: Command) {
        self.state.lock().unwrap().log.push(command);
    }

    fn element(&self, spec: ElementSpec) -> UIElement {
        UIElement::new(Box::new(FakeElement {
            device: self.clone(),
            spec,
        }))
    }
}

#[async_trait]
impl AutomationEngine for FakeDevice {
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError> {
        self.record(Command::Find(selector.clone()));
        let specs = {
            let state = self.state.lock().unwrap();
            if state.fail_finds {
                return Err(AutomationError::PlatformError(
                    "instrumentation crashed".to_string(),
                ));
            }
            state.screen.get(selector).cloned().unwrap_or_default()
        };
        Ok(specs.into_iter().map(|spec| self.element(spec)).collect())
    }

    async fn activate_app(&self, package: &str) -> Result<(), AutomationError> {
        self.record(Command::ActivateApp(package.to_string()));
        if self.state.lock().unwrap().fail_open.contains(package) {
            return Err(AutomationError::PlatformError(format!(
                "{package} is not installed"
            )));
        }
        Ok(())
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), AutomationError> {
        self.record(Command::StartActivity(
            package.to_string(),
            activity.to_string(),
        ));
        if self.state.lock().unwrap().fail_open.contains(package) {
            return Err(AutomationError::PlatformError(format!(
                "{package} is not installed"
            )));
        }
        Ok(())
    }

    async fn back(&self) -> Result<(), AutomationError> {
        self.record(Command::Back);
        if self.state.lock().unwrap().fail_back {
            return Err(AutomationError::SessionError("device offline".to_string()));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<ScreenshotResult, AutomationError> {
        self.record(Command::Screenshot);
        Ok(ScreenshotResult {
            image_data: FAKE_PNG.to_vec(),
        })
    }

    async fn current_package(&self) -> Result<String, AutomationError> {
        Ok("com.example.fake".to_string())
    }

    async fn current_activity(&self) -> Result<String, AutomationError> {
        Ok(".MainActivity".to_string())
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            session_id: "fake-session".to_string(),
            device_name: Some("fake-device".to_string()),
            platform_name: Some("Android".to_string()),
            platform_version: Some("14".to_string()),
        }
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        self.record(Command::Quit);
        Ok(())
    }
}

struct FakeElement {
    device: FakeDevice,
    spec: ElementSpec,
}

impl std::fmt::Debug for FakeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeElement")
            .field("id", &self.spec.id)
            .finish()
    }
}

#[async_trait]
impl UIElementImpl for FakeElement {
    fn id(&self) -> String {
        self.spec.id.clone()
    }

    async fn text(&self) -> Result<String, AutomationError> {
        Ok(self.spec.text.clone())
    }

    async fn is_enabled(&self) -> Result<bool, AutomationError> {
        Ok(self.spec.enabled)
    }

    async fn is_displayed(&self) -> Result<bool, AutomationError> {
        Ok(self.spec.displayed)
    }

    async fn bounds(&self) -> Result<Bounds, AutomationError> {
        Ok(self.spec.bounds)
    }

    async fn click(&self) -> Result<(), AutomationError> {
        self.device.record(Command::Click(self.spec.id.clone()));
        if self.spec.click_fails {
            return Err(AutomationError::ElementDetached(self.spec.id.clone()));
        }
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.device
            .record(Command::SendKeys(self.spec.id.clone(), text.to_string()));
        Ok(())
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError> {
        self.device
            .record(Command::FindIn(self.spec.id.clone(), selector.clone()));
        if self.device.state.lock().unwrap().fail_finds {
            return Err(AutomationError::PlatformError(
                "instrumentation crashed".to_string(),
            ));
        }
        Ok(self
            .spec
            .children
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, spec)| self.device.element(spec.clone()))
            .collect())
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(FakeElement {
            device: self.device.clone(),
            spec: self.spec.clone(),
        })
    }
}

/// Hands out the same fake device for every session
pub struct FakeConnector {
    device: FakeDevice,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(device: FakeDevice) -> Self {
        Self {
            device,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn AutomationEngine>, AutomationError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.device.engine())
    }
}

pub struct UnreachableConnector;

#[async_trait]
impl EngineConnector for UnreachableConnector {
    async fn connect(&self) -> Result<Arc<dyn AutomationEngine>, AutomationError> {
        Err(AutomationError::SessionError(
            "Could not create session: connection refused".to_string(),
        ))
    }
}

/// Records every archive it is asked to deliver
#[derive(Default)]
pub struct RecordingDelivery {
    pub delivered: Mutex<Vec<PathBuf>>,
}

impl RecordingDelivery {
    pub fn calls(&self) -> Vec<PathBuf> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, archive: &Path, _stamp: &str) -> Result<bool, DeliveryError> {
        self.delivered.lock().unwrap().push(archive.to_path_buf());
        Ok(true)
    }
}
