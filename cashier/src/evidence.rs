//! Per-run screenshot storage

use crate::errors::AutomationError;
use crate::Device;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Screenshot capture failed: {0}")]
    Capture(#[from] AutomationError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Which variant of the cashier screenshot this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    Success,
    Failed,
}

impl OutcomeLabel {
    pub fn from_success(success: bool) -> Self {
        if success {
            OutcomeLabel::Success
        } else {
            OutcomeLabel::Failed
        }
    }
}

impl fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeLabel::Success => f.write_str("cashier_success"),
            OutcomeLabel::Failed => f.write_str("cashier_failed"),
        }
    }
}

/// Run timestamp used in directory, screenshot and archive names.
pub fn run_stamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Directory holding one run's screenshots
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    run_dir: PathBuf,
    stamp: String,
}

impl EvidenceStore {
    /// Create `base/<stamp>/`.
    pub fn create(base: &Path, stamp: &str) -> Result<Self, EvidenceError> {
        let run_dir = base.join(stamp);
        std::fs::create_dir_all(&run_dir).map_err(|source| EvidenceError::Io {
            path: run_dir.clone(),
            source,
        })?;
        Ok(Self {
            run_dir,
            stamp: stamp.to_string(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn screenshot_path(&self, app_name: &str, label: OutcomeLabel) -> PathBuf {
        self.run_dir.join(format!(
            "{}_{label}_{}.png",
            file_safe(app_name),
            self.stamp
        ))
    }

    /// Capture the current screen into `{app}_{label}_{stamp}.png`.
    pub async fn capture(
        &self,
        device: &Device,
        app_name: &str,
        label: OutcomeLabel,
    ) -> Result<PathBuf, EvidenceError> {
        let shot = device.capture_screen().await?;
        let path = self.screenshot_path(app_name, label);
        tokio::fs::write(&path, &shot.image_data)
            .await
            .map_err(|source| EvidenceError::Io {
                path: path.clone(),
                source,
            })?;
        info!("Saved screenshot {}", path.display());
        Ok(path)
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
