use crate::errors::AutomationError;
use crate::selector::Selector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// On-screen rectangle of an element, in device-independent units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Interface for driver-specific element implementations
#[async_trait]
pub trait UIElementImpl: Send + Sync + Debug {
    /// Driver-assigned element reference.
    fn id(&self) -> String;
    async fn text(&self) -> Result<String, AutomationError>;
    async fn is_enabled(&self) -> Result<bool, AutomationError>;
    async fn is_displayed(&self) -> Result<bool, AutomationError>;
    async fn bounds(&self) -> Result<Bounds, AutomationError>;
    async fn click(&self) -> Result<(), AutomationError>;
    async fn send_keys(&self, text: &str) -> Result<(), AutomationError>;
    /// Search the subtree rooted at this element.
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<UIElement>, AutomationError>;
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
}

/// Represents a UI element on the device screen
#[derive(Debug)]
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

impl UIElement {
    pub fn new(inner: Box<dyn UIElementImpl>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> String {
        self.inner.id()
    }

    pub async fn text(&self) -> Result<String, AutomationError> {
        self.inner.text().await
    }

    pub async fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.inner.is_enabled().await
    }

    pub async fn is_displayed(&self) -> Result<bool, AutomationError> {
        self.inner.is_displayed().await
    }

    /// Visible and enabled, the condition a click waits for.
    pub async fn is_clickable(&self) -> Result<bool, AutomationError> {
        Ok(self.inner.is_displayed().await? && self.inner.is_enabled().await?)
    }

    pub async fn bounds(&self) -> Result<Bounds, AutomationError> {
        self.inner.bounds().await
    }

    pub async fn click(&self) -> Result<(), AutomationError> {
        self.inner.click().await
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.send_keys(text).await
    }

    pub async fn find_elements(
        &self,
        selector: &Selector,
    ) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.find_elements(selector).await
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id() == other.inner.id()
    }
}

impl Eq for UIElement {}
