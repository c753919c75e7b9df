use tracing::{debug, instrument};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::platforms::AutomationEngine;
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a wait has to observe before it succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one element is attached to the hierarchy
    Present,
    /// The first match is displayed
    Visible,
    /// The first match is displayed and enabled
    Clickable,
}

/// A high-level API for finding and waiting on device elements
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn AutomationEngine>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    poll_interval: Duration,
}

impl Locator {
    /// Create a new locator with the given selector
    pub(crate) fn new(engine: Arc<dyn AutomationEngine>, selector: Selector) -> Self {
        Self {
            engine,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// All elements currently matching, without waiting.
    pub async fn all(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.engine.find_elements(&self.selector).await
    }

    /// First element currently matching, without waiting.
    pub async fn first(&self) -> Result<Option<UIElement>, AutomationError> {
        Ok(self.all().await?.into_iter().next())
    }

    /// Poll until `condition` holds for the first match, up to `timeout`
    /// (or the locator's default). At least one probe is always made.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_for(
        &self,
        condition: WaitCondition,
        timeout: Option<Duration>,
    ) -> Result<UIElement, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        // Saturate instead of overflowing on absurd timeouts.
        let deadline = started
            .checked_add(effective_timeout)
            .unwrap_or_else(|| started + Duration::from_secs(86_400 * 365));
        let mut last_error: Option<AutomationError> = None;

        loop {
            match self.probe(condition).await {
                Ok(Some(element)) => return Ok(element),
                Ok(None) => {}
                // The element may vanish between lookup and state query.
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("condition {condition:?} never held"));
        Err(AutomationError::Timeout(format!(
            "Timed out after {effective_timeout:?} waiting for element {}: {reason}",
            self.selector
        )))
    }

    async fn probe(&self, condition: WaitCondition) -> Result<Option<UIElement>, AutomationError> {
        let Some(element) = self.first().await? else {
            return Ok(None);
        };
        let satisfied = match condition {
            WaitCondition::Present => true,
            WaitCondition::Visible => element.is_displayed().await?,
            WaitCondition::Clickable => element.is_clickable().await?,
        };
        debug!(?condition, satisfied, "probed {}", self.selector);
        Ok(satisfied.then_some(element))
    }
}
