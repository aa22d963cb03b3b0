use crate::error::LaunchError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Spawns a target executable and forgets about it
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `executable_path` with `working_directory` as its cwd
    ///
    /// # Returns
    /// * `Ok(())` - The OS accepted the spawn
    /// * `Err(LaunchError)` - Nothing was started; retrying is the caller's call
    async fn launch(&self, executable_path: &Path, working_directory: &Path)
        -> Result<(), LaunchError>;
}

/// Launcher that detaches the child from the watchdog
///
/// stdio goes to the null device and the child gets its own process group,
/// so it survives the watchdog and never receives its terminal signals. The
/// child handle is dropped right after spawn and the runtime reaps it.
#[derive(Debug, Default, Clone)]
pub struct DetachedLauncher;

impl DetachedLauncher {
    pub fn new() -> Self {
        Self
    }

    fn build_command(executable_path: &Path, working_directory: &Path) -> Command {
        let mut command = Command::new(executable_path);
        command
            .current_dir(working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        #[cfg(unix)]
        command.process_group(0);

        #[cfg(windows)]
        {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        command
    }
}

#[async_trait]
impl ProcessLauncher for DetachedLauncher {
    async fn launch(
        &self,
        executable_path: &Path,
        working_directory: &Path,
    ) -> Result<(), LaunchError> {
        if !executable_path.exists() {
            return Err(LaunchError::NotFound(executable_path.to_path_buf()));
        }

        if !working_directory.is_dir() {
            return Err(LaunchError::WorkingDirectory(working_directory.to_path_buf()));
        }

        let child = Self::build_command(executable_path, working_directory)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => LaunchError::NotFound(executable_path.to_path_buf()),
                ErrorKind::PermissionDenied => {
                    LaunchError::PermissionDenied(executable_path.to_path_buf())
                }
                _ => LaunchError::Spawn {
                    path: executable_path.to_path_buf(),
                    source: e,
                },
            })?;

        tracing::debug!(
            "Launched {} (PID: {:?}) in {}",
            executable_path.display(),
            child.id(),
            working_directory.display()
        );

        drop(child);
        Ok(())
    }
}
