//! Run orchestration: every flow, one session, one archive

use crate::archive::{self, ArchiveError};
use crate::config::MonitorConfig;
use crate::errors::AutomationError;
use crate::evidence::{self, EvidenceError, EvidenceStore, OutcomeLabel};
use crate::executor::{FlowExecutor, FlowReport};
use crate::flow::{self, FlowError, FlowSource};
use crate::mailer::{Delivery, SmtpDelivery};
use crate::platforms::{AppiumConnector, EngineConnector};
use crate::Device;
use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to load flows: {0}")]
    Flows(#[from] FlowError),

    #[error("Failed to prepare screenshot directory: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("Failed to establish driver session: {0}")]
    Session(AutomationError),
}

/// Result for one app
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub app_name: String,
    pub success: bool,
    pub screenshot: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FlowReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_stamp: String,
    pub run_dir: PathBuf,
    pub outcomes: Vec<RunOutcome>,
    pub archive: Option<PathBuf>,
    pub delivered: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct Monitor {
    config: MonitorConfig,
    connector: Arc<dyn EngineConnector>,
    delivery: Arc<dyn Delivery>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        connector: Arc<dyn EngineConnector>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            config,
            connector,
            delivery,
        }
    }

    /// Appium session and SMTP delivery as configured.
    pub fn from_config(config: MonitorConfig) -> Self {
        let connector = Arc::new(AppiumConnector::new(config.appium.clone()));
        let delivery = Arc::new(SmtpDelivery::new(config.email.clone()));
        Self::new(config, connector, delivery)
    }

    pub async fn run(&self) -> Result<RunSummary, MonitorError> {
        self.run_with_stamp(evidence::run_stamp(Local::now())).await
    }

    /// Run every flow under `stamp`.
    ///
    /// Only a missing flow directory, an unwritable screenshot directory or a
    /// failed session abort the run; every other failure becomes a failed
    /// outcome.
    #[instrument(skip(self))]
    pub async fn run_with_stamp(&self, stamp: String) -> Result<RunSummary, MonitorError> {
        let sources = flow::load_dir(&self.config.flows.directory)?;
        if sources.is_empty() {
            warn!(
                "No flow files in {}",
                self.config.flows.directory.display()
            );
        }
        info!("Loaded {} flow file(s)", sources.len());

        let store = EvidenceStore::create(&self.config.screenshots.directory, &stamp)?;

        let engine = self.connector.connect().await.map_err(|e| {
            error!("Driver session could not be established: {e}");
            MonitorError::Session(e)
        })?;
        let device = Device::new(engine).with_poll_interval(self.config.timing.wait_poll());
        let session = device.session_info();
        info!(
            "Session {} on {}",
            session.session_id,
            session.device_name.as_deref().unwrap_or("unknown device")
        );

        let outcomes = self.run_flows(&device, &store, &sources).await;

        if let Err(e) = device.quit().await {
            warn!("Failed to close driver session: {e}");
        }

        let archive = match archive::package_run(store.run_dir(), &stamp) {
            Ok(path) => Some(path),
            Err(ArchiveError::Empty(dir)) => {
                warn!("Nothing to archive in {}", dir.display());
                None
            }
            Err(e) => {
                error!("Failed to package screenshots: {e}");
                None
            }
        };

        let delivered = match &archive {
            Some(path) => match self.delivery.deliver(path, &stamp).await {
                Ok(sent) => sent,
                Err(e) => {
                    error!("Failed to deliver report: {e}");
                    false
                }
            },
            None => false,
        };

        let summary = RunSummary {
            run_stamp: stamp,
            run_dir: store.run_dir().to_path_buf(),
            outcomes,
            archive,
            delivered,
        };
        info!(
            "Run finished: {} succeeded, {} failed",
            summary.succeeded(),
            summary.failed()
        );
        Ok(summary)
    }

    async fn run_flows(
        &self,
        device: &Device,
        store: &EvidenceStore,
        sources: &[FlowSource],
    ) -> Vec<RunOutcome> {
        let executor = FlowExecutor::new(
            device.clone(),
            self.config.timing.clone(),
            self.config.popups.clone(),
        );
        let pause = self.config.timing.inter_app_pause();
        let mut outcomes = Vec::with_capacity(sources.len());

        for (index, source) in sources.iter().enumerate() {
            let name = source.name().to_string();
            info!("=== {name} ({}/{}) ===", index + 1, sources.len());

            let (success, error, report) = match &source.flow {
                Ok(flow) => {
                    let report = executor.execute_flow(flow).await;
                    let error = report
                        .open_error
                        .clone()
                        .or_else(|| {
                            report
                                .steps
                                .iter()
                                .rev()
                                .find(|s| !s.success && s.mandatory)
                                .and_then(|s| s.error.clone())
                        });
                    (report.success, error, Some(report))
                }
                Err(e) => {
                    error!("Skipping {}: {e}", source.path.display());
                    (false, Some(e.to_string()), None)
                }
            };

            let label = OutcomeLabel::from_success(success);
            let screenshot = match store.capture(device, &name, label).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("No screenshot for {name}: {e}");
                    None
                }
            };

            if success {
                info!("{name}: reached cashier screen");
            } else {
                warn!("{name}: failed");
            }
            outcomes.push(RunOutcome {
                app_name: name,
                success,
                screenshot,
                error,
                report,
            });

            if index + 1 < sources.len() && !pause.is_zero() {
                sleep(pause).await;
            }
        }

        outcomes
    }
}
