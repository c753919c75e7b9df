//! Android Debug Bridge recovery helpers used by the `doctor` command

use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Packages left behind by an interrupted UiAutomator2 install.
pub const UIAUTOMATOR2_PACKAGES: &[&str] = &[
    "io.appium.uiautomator2.server",
    "io.appium.uiautomator2.server.test",
];

const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("adb executable not found (set adb.path or ANDROID_HOME)")]
    NotFound,

    #[error("Failed to run adb {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("adb {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("adb {command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// A line of `adb devices` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedDevice {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl AttachedDevice {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Parse the output of `adb devices`.
pub fn parse_devices(output: &str) -> Vec<AttachedDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(AttachedDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

fn adb_file_name() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

/// Find the adb executable: explicit path, then `PATH`, then the SDK.
pub fn locate_adb(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.is_file().then(|| path.to_path_buf());
    }

    let name = adb_file_name();
    if let Some(paths) = env::var_os("PATH") {
        if let Some(found) = env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
        {
            return Some(found);
        }
    }

    ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|var| env::var_os(var))
        .map(|sdk| PathBuf::from(sdk).join("platform-tools").join(name))
        .find(|candidate| candidate.is_file())
}

/// Kill every running process named like adb. Returns how many were killed.
pub fn kill_adb_processes() -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed = 0;
    for (pid, process) in system.processes() {
        let name = process.name().to_string_lossy().to_lowercase();
        if name != "adb" && name != "adb.exe" {
            continue;
        }
        if process.kill() {
            info!("Killed adb process {}", pid.as_u32());
            killed += 1;
        } else {
            warn!("Failed to kill adb process {}", pid.as_u32());
        }
    }
    killed
}

/// Thin wrapper over one adb executable
#[derive(Debug, Clone)]
pub struct DeviceBridge {
    adb: PathBuf,
}

impl DeviceBridge {
    pub fn new(adb: PathBuf) -> Self {
        Self { adb }
    }

    pub fn locate(configured: Option<&Path>) -> Result<Self, BridgeError> {
        locate_adb(configured).map(Self::new).ok_or(BridgeError::NotFound)
    }

    pub fn path(&self) -> &Path {
        &self.adb
    }

    async fn run(&self, args: &[&str]) -> Result<String, BridgeError> {
        let command = args.join(" ");
        debug!("Running {} {command}", self.adb.display());
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new(&self.adb).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| BridgeError::Timeout {
            command: command.clone(),
            timeout: COMMAND_TIMEOUT,
        })?
        .map_err(|source| BridgeError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(BridgeError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn version(&self) -> Result<String, BridgeError> {
        Ok(self.run(&["version"]).await?.trim().to_string())
    }

    pub async fn kill_server(&self) -> Result<(), BridgeError> {
        self.run(&["kill-server"]).await.map(|_| ())
    }

    pub async fn start_server(&self) -> Result<(), BridgeError> {
        self.run(&["start-server"]).await.map(|_| ())
    }

    /// `kill-server` followed by `start-server`. A failed kill is not fatal.
    pub async fn restart_server(&self) -> Result<(), BridgeError> {
        if let Err(e) = self.kill_server().await {
            warn!("adb kill-server failed: {e}");
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.start_server().await
    }

    pub async fn devices(&self) -> Result<Vec<AttachedDevice>, BridgeError> {
        Ok(parse_devices(&self.run(&["devices"]).await?))
    }

    pub async fn uninstall(&self, package: &str) -> Result<(), BridgeError> {
        self.run(&["uninstall", package]).await.map(|_| ())
    }

    /// Remove stale UiAutomator2 server packages; missing packages are ignored.
    pub async fn reset_uiautomator2(&self) -> Vec<(String, Result<(), BridgeError>)> {
        let mut results = Vec::new();
        for package in UIAUTOMATOR2_PACKAGES {
            let result = self.uninstall(package).await;
            results.push((package.to_string(), result));
        }
        results
    }
}
