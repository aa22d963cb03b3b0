// PID file management for the single-instance guard

use crate::error::{Result, WatchdogError};
use crate::process::is_pid_alive;
use std::fs;
use std::path::{Path, PathBuf};

/// Manages the watchdog PID file
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write the current process PID to the file
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    WatchdogError::PidFileError(format!("Failed to create PID directory: {}", e))
                })?;
            }
        }

        fs::write(&self.path, std::process::id().to_string())
            .map_err(|e| WatchdogError::PidFileError(format!("Failed to write PID file: {}", e)))
    }

    /// Read the PID from the file
    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| WatchdogError::PidFileError(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| WatchdogError::PidFileError(format!("Invalid PID in file: {}", e)))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the PID file
    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                WatchdogError::PidFileError(format!("Failed to remove PID file: {}", e))
            })?;
        }
        Ok(())
    }

    /// PID of another live watchdog holding this file, if any
    pub fn running_instance(&self) -> Option<u32> {
        if !self.exists() {
            return None;
        }

        match self.read() {
            Ok(pid) if pid != std::process::id() && is_pid_alive(pid) => Some(pid),
            _ => None,
        }
    }

    /// Claim the file for this process
    ///
    /// A stale file left by a dead process is overwritten.
    pub fn acquire(self) -> Result<PidGuard> {
        if let Some(pid) = self.running_instance() {
            return Err(WatchdogError::AlreadyRunning(pid));
        }

        self.write()?;
        Ok(PidGuard { pid_file: self })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Removes the PID file when dropped
pub struct PidGuard {
    pid_file: PidFile,
}

impl PidGuard {
    pub fn path(&self) -> &Path {
        self.pid_file.path()
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        if let Err(e) = self.pid_file.remove() {
            tracing::warn!("{}", e);
        }
    }
}
