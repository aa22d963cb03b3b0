use crate::error::{Result, WatchdogError};
use crate::process::{validate_interval, SchedulerConfig, MAX_CHECK_INTERVAL_SECS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod legacy;

/// Watchdog-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Maximum number of concurrently monitored targets
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,

    /// Seconds between a relaunch and its verification probe
    #[serde(default = "default_verify_delay")]
    pub verify_delay_secs: u64,

    /// Interval given to targets added without one (in seconds)
    #[serde(default = "default_interval")]
    pub default_interval_secs: u64,

    /// Directory for per-target and system log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Where the target list is persisted (.json or .toml)
    #[serde(default = "default_targets_file")]
    pub targets_file: PathBuf,

    /// Single-instance guard
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Unix socket the running watchdog accepts commands on
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Capacity of the status and log broadcast channels
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

// Default value functions for serde
fn default_max_targets() -> usize {
    5
}

fn default_verify_delay() -> u64 {
    5
}

fn default_interval() -> u64 {
    5
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("procwatch_logs")
}

fn default_targets_file() -> PathBuf {
    std::env::temp_dir().join("procwatch_targets.json")
}

fn default_pid_file() -> PathBuf {
    std::env::temp_dir().join("procwatch.pid")
}

fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("procwatch.sock")
}

fn default_event_capacity() -> usize {
    256
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_targets: default_max_targets(),
            verify_delay_secs: default_verify_delay(),
            default_interval_secs: default_interval(),
            log_dir: default_log_dir(),
            targets_file: default_targets_file(),
            pid_file: default_pid_file(),
            socket_path: default_socket_path(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl WatchdogConfig {
    /// Load settings from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WatchdogError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config: WatchdogConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| WatchdogError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| WatchdogError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(WatchdogError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_targets == 0 {
            return Err(WatchdogError::ConfigValidationError(
                "max_targets must be at least 1".to_string(),
            ));
        }

        if self.verify_delay_secs == 0 || self.verify_delay_secs > MAX_CHECK_INTERVAL_SECS {
            return Err(WatchdogError::ConfigValidationError(format!(
                "verify_delay_secs must be between 1 and {}",
                MAX_CHECK_INTERVAL_SECS
            )));
        }

        validate_interval(self.default_interval_secs).map_err(|e| {
            WatchdogError::ConfigValidationError(format!("default_interval_secs: {}", e))
        })?;

        if self.event_capacity == 0 {
            return Err(WatchdogError::ConfigValidationError(
                "event_capacity must be at least 1".to_string(),
            ));
        }

        for (field, path) in [
            ("log_dir", &self.log_dir),
            ("targets_file", &self.targets_file),
            ("pid_file", &self.pid_file),
            ("socket_path", &self.socket_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(WatchdogError::ConfigValidationError(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        Ok(())
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_secs(self.verify_delay_secs)
    }

    /// Scheduler settings derived from this configuration
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_targets: self.max_targets,
            verify_delay: self.verify_delay(),
            event_capacity: self.event_capacity,
        }
    }

    /// Expand environment variables in path fields
    fn expand_env_vars(&mut self) {
        self.log_dir = expand_env_in_path(&self.log_dir);
        self.targets_file = expand_env_in_path(&self.targets_file);
        self.pid_file = expand_env_in_path(&self.pid_file);
        self.socket_path = expand_env_in_path(&self.socket_path);
    }
}

/// Expand `$VAR` and `${VAR}` in a string
pub(crate) fn expand_env_in_string(s: &str) -> String {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();

    // Longer names first so $APP_DIR is not eaten by $APP
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut result = s.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

/// Expand environment variables in a path
pub(crate) fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}
