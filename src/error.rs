use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the watchdog
#[derive(Debug, Error)]
pub enum WatchdogError {
    // Monitoring errors (caught inside a tick, logged, never propagated out of it)
    #[error("Process table query failed: {0}")]
    ProbeFailure(String),

    #[error("Launch failed: {0}")]
    LaunchFailure(#[from] LaunchError),

    // Validation errors returned synchronously to the caller
    #[error("A target already watches {}", .0.display())]
    DuplicateTarget(PathBuf),

    #[error("Cannot monitor more than {0} targets at once")]
    CapacityExceeded(usize),

    #[error("Target {0} is being monitored: {1}")]
    TargetBusy(String, String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Check interval must be between {min} and {max} seconds, got {value}")]
    InvalidInterval { value: u64, min: u64, max: u64 },

    #[error("Invalid executable path: {0}")]
    InvalidPath(String),

    // Persistence errors
    #[error("Failed to persist targets: {0}")]
    ConfigPersistError(String),

    #[error("Failed to load targets: {0}")]
    ConfigLoadError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Instance guard
    #[error("Another watchdog instance is already running (PID {0})")]
    AlreadyRunning(u32),

    #[error("PID file error: {0}")]
    PidFileError(String),

    #[error("Log error: {0}")]
    LogError(String),

    // Control channel to a running watchdog
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Watchdog is not running. Start it with: procwatch run")]
    WatchdogNotRunning,

    #[error("Running watchdog rejected the command: {0}")]
    CommandRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a relaunch could not be dispatched
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("executable does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied launching {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("working directory is unusable: {}", .0.display())]
    WorkingDirectory(PathBuf),

    #[error("failed to spawn {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for watchdog operations
pub type Result<T> = std::result::Result<T, WatchdogError>;
