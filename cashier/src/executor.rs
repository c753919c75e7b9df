//! Flow interpretation with a retrying safe-action wrapper

use crate::config::{PopupSettings, TimingSettings};
use crate::errors::AutomationError;
use crate::flow::{ActionKind, FlowDescriptor, FlowError, StepDescriptor};
use crate::locator::WaitCondition;
use crate::popup::PopupHandler;
use crate::Device;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Attempts per step before it counts as exhausted
pub const SAFE_ACTION_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum StepError {
    /// Not retried; the step can never succeed as written.
    #[error("Invalid step configuration: {0}")]
    Config(#[from] FlowError),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: usize,
        last_error: AutomationError,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub description: String,
    pub mandatory: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happened to one app's flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub app_name: String,
    pub success: bool,
    /// Set when the app could not be opened; no steps ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_error: Option<String>,
    pub steps: Vec<StepReport>,
}

/// Runs flows against a device, sweeping popups between failed attempts
pub struct FlowExecutor {
    device: Device,
    popups: PopupHandler,
    timing: TimingSettings,
    retry_sweep_rounds: usize,
    quick_check_between_steps: bool,
}

impl FlowExecutor {
    pub fn new(device: Device, timing: TimingSettings, popup_settings: PopupSettings) -> Self {
        let retry_sweep_rounds = popup_settings.retry_sweep_rounds;
        let quick_check_between_steps = popup_settings.quick_check_between_steps;
        Self {
            popups: PopupHandler::new(device.clone(), popup_settings),
            device,
            timing,
            retry_sweep_rounds,
            quick_check_between_steps,
        }
    }

    /// Open the app, then run every step in order.
    ///
    /// A mandatory step that fails aborts the flow; an optional one is
    /// recorded and skipped.
    #[instrument(skip(self, flow), fields(app = %flow.app_name))]
    pub async fn execute_flow(&self, flow: &FlowDescriptor) -> FlowReport {
        let mut report = FlowReport {
            app_name: flow.app_name.clone(),
            success: false,
            open_error: None,
            steps: Vec::with_capacity(flow.steps.len()),
        };

        info!("Opening {} ({})", flow.app_name, flow.app_package);
        if let Err(e) = self
            .device
            .open_app(&flow.app_package, flow.app_activity.as_deref())
            .await
        {
            error!("Failed to open {}: {e}", flow.app_name);
            self.popups.handle_popups(self.retry_sweep_rounds).await;
            report.open_error = Some(e.to_string());
            return report;
        }
        settle(self.timing.app_open_settle()).await;

        let total = flow.steps.len();
        for (index, step) in flow.steps.iter().enumerate() {
            info!("Step {}/{total}: {}", index + 1, step.description);
            let result = self.perform_safe_action(step).await;
            report.steps.push(StepReport {
                description: step.description.clone(),
                mandatory: step.mandatory,
                success: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            match result {
                Ok(()) => {
                    if self.quick_check_between_steps {
                        self.popups.quick_popup_check().await;
                    }
                }
                Err(e) if step.mandatory => {
                    error!("Mandatory step '{}' failed: {e}", step.description);
                    return report;
                }
                Err(e) => {
                    warn!("Optional step '{}' failed, continuing: {e}", step.description);
                }
            }
        }

        info!("Flow for {} completed", flow.app_name);
        report.success = true;
        report
    }

    /// Run one step with up to [`SAFE_ACTION_ATTEMPTS`] attempts.
    ///
    /// A popup sweep follows every failed attempt. Configuration errors fail
    /// immediately without touching the device.
    pub async fn perform_safe_action(&self, step: &StepDescriptor) -> Result<(), StepError> {
        let selector = step.resolve_selector().inspect_err(|e| error!("{e}"))?;
        let input = match step.action {
            ActionKind::SendKeys => {
                Some(step.required_input().inspect_err(|e| error!("{e}"))?)
            }
            ActionKind::Click | ActionKind::Wait => None,
        };

        let locator = self.device.locator(selector);
        let timeout = step.timeout();
        let mut last_error = None;

        for attempt in 1..=SAFE_ACTION_ATTEMPTS {
            let outcome = match step.action {
                ActionKind::Click => {
                    match locator
                        .wait_for(WaitCondition::Clickable, Some(timeout))
                        .await
                    {
                        Ok(element) => element.click().await,
                        Err(e) => Err(e),
                    }
                }
                ActionKind::SendKeys => {
                    match locator
                        .wait_for(WaitCondition::Visible, Some(timeout))
                        .await
                    {
                        Ok(element) => element.send_keys(input.unwrap_or_default()).await,
                        Err(e) => Err(e),
                    }
                }
                ActionKind::Wait => locator
                    .wait_for(WaitCondition::Present, Some(timeout))
                    .await
                    .map(|_| ()),
            };

            match outcome {
                Ok(()) => {
                    info!("Done: {}", step.description);
                    settle(self.timing.step_settle()).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Attempt {attempt}/{SAFE_ACTION_ATTEMPTS} of '{}' failed: {e}",
                        step.description
                    );
                    let sweep = self.popups.handle_popups(self.retry_sweep_rounds).await;
                    info!(
                        "Popup sweep after attempt {attempt}: {} dismissal(s) in {} round(s)",
                        sweep.dismissals.len(),
                        sweep.rounds
                    );
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| {
            AutomationError::Internal(format!("no attempt made for '{}'", step.description))
        });
        error!(
            "'{}' failed after {SAFE_ACTION_ATTEMPTS} attempts",
            step.description
        );
        Err(StepError::Exhausted {
            attempts: SAFE_ACTION_ATTEMPTS,
            last_error,
        })
    }
}

async fn settle(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}
