use crate::error::{Result, WatchdogError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Shortest allowed check interval (seconds)
pub const MIN_CHECK_INTERVAL_SECS: u64 = 5;

/// Longest allowed check interval (seconds)
pub const MAX_CHECK_INTERVAL_SECS: u64 = 3600;

/// Opaque target identifier, stable across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(Uuid);

impl TargetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetId {
    type Err = WatchdogError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| WatchdogError::TargetNotFound(s.to_string()))
    }
}

/// A monitored executable as persisted by the config store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub id: TargetId,

    /// Absolute path of the binary to watch
    pub executable_path: PathBuf,

    /// Seconds between two checks
    pub check_interval_secs: u64,

    /// Relaunch when the target is found absent
    #[serde(default = "default_auto_relaunch")]
    pub auto_relaunch: bool,

    /// Overrides the executable's parent directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    /// Overrides the executable's file name in logs and listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

fn default_auto_relaunch() -> bool {
    true
}

impl TargetDescriptor {
    /// Create a descriptor with a fresh id and auto-relaunch enabled
    pub fn new<P: Into<PathBuf>>(executable_path: P, check_interval_secs: u64) -> Self {
        Self {
            id: TargetId::new(),
            executable_path: executable_path.into(),
            check_interval_secs,
            auto_relaunch: default_auto_relaunch(),
            working_directory: None,
            display_name: None,
        }
    }

    pub fn with_auto_relaunch(mut self, auto_relaunch: bool) -> Self {
        self.auto_relaunch = auto_relaunch;
        self
    }

    /// Validate the path and interval bounds
    pub fn validate(&self) -> Result<()> {
        validate_executable_path(&self.executable_path)?;
        validate_interval(self.check_interval_secs)?;

        if let Some(ref name) = self.display_name {
            if name.trim().is_empty() {
                return Err(WatchdogError::InvalidPath(
                    "display name cannot be blank".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Base file name the probe looks for in the process table
    pub fn process_name(&self) -> String {
        self.executable_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn display_name(&self) -> String {
        match self.display_name {
            Some(ref name) => name.clone(),
            None => self.process_name(),
        }
    }

    pub fn working_directory(&self) -> PathBuf {
        match self.working_directory {
            Some(ref dir) => dir.clone(),
            None => self
                .executable_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Check that an interval falls inside the allowed bounds
pub fn validate_interval(secs: u64) -> Result<()> {
    if !(MIN_CHECK_INTERVAL_SECS..=MAX_CHECK_INTERVAL_SECS).contains(&secs) {
        return Err(WatchdogError::InvalidInterval {
            value: secs,
            min: MIN_CHECK_INTERVAL_SECS,
            max: MAX_CHECK_INTERVAL_SECS,
        });
    }
    Ok(())
}

fn validate_executable_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(WatchdogError::InvalidPath("path is empty".to_string()));
    }
    if !path.is_absolute() {
        return Err(WatchdogError::InvalidPath(format!(
            "{} is not an absolute path",
            path.display()
        )));
    }
    if path.file_name().is_none() {
        return Err(WatchdogError::InvalidPath(format!(
            "{} does not name a file",
            path.display()
        )));
    }
    Ok(())
}

/// Last known liveness of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    NotMonitoring,
    Unknown,
    Running,
    NotRunning,
}

impl TargetStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TargetStatus::NotMonitoring => "not monitoring",
            TargetStatus::Unknown => "unknown",
            TargetStatus::Running => "running",
            TargetStatus::NotRunning => "not running",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where a target currently is in its check/relaunch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPhase {
    Idle,
    Checking,
    ObservedRunning,
    ObservedAbsent,
    Relaunching,
    VerifyPending,
    Stopped,
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorPhase::Idle => write!(f, "idle"),
            MonitorPhase::Checking => write!(f, "checking"),
            MonitorPhase::ObservedRunning => write!(f, "observed running"),
            MonitorPhase::ObservedAbsent => write!(f, "observed absent"),
            MonitorPhase::Relaunching => write!(f, "relaunching"),
            MonitorPhase::VerifyPending => write!(f, "verify pending"),
            MonitorPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Runtime-only monitoring state of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    pub status: TargetStatus,
    pub phase: MonitorPhase,
    /// `None` means the target was never checked in the current run
    pub last_checked_at: Option<DateTime<Local>>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            status: TargetStatus::NotMonitoring,
            phase: MonitorPhase::Idle,
            last_checked_at: None,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.status != TargetStatus::NotMonitoring
    }

    pub(crate) fn mark_started(&mut self) {
        self.status = TargetStatus::Unknown;
        self.phase = MonitorPhase::Idle;
        self.last_checked_at = None;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.status = TargetStatus::NotMonitoring;
        self.phase = MonitorPhase::Stopped;
        self.last_checked_at = None;
    }

    pub(crate) fn mark_checked(&mut self, status: Option<TargetStatus>) {
        if let Some(status) = status {
            self.status = status;
        }
        self.last_checked_at = Some(Local::now());
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Status change pushed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub target_id: TargetId,
    pub is_running: bool,
    pub last_checked_at: Option<DateTime<Local>>,
    pub status_label: String,
    pub stopped: bool,
}

impl StatusEvent {
    pub fn from_state(target_id: TargetId, state: &MonitorState) -> Self {
        Self {
            target_id,
            is_running: state.status == TargetStatus::Running,
            last_checked_at: state.last_checked_at,
            status_label: state.status.label().to_string(),
            stopped: !state.is_monitoring(),
        }
    }
}

/// Point-in-time view of a target for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub descriptor: TargetDescriptor,
    pub status: TargetStatus,
    pub phase: MonitorPhase,
    pub last_checked_at: Option<DateTime<Local>>,
}

impl TargetSnapshot {
    pub fn is_monitoring(&self) -> bool {
        self.status != TargetStatus::NotMonitoring
    }
}
