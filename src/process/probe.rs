use crate::error::{Result, WatchdogError};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Liveness query against the OS process table
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Whether any process whose image name matches `executable_name`
    /// (case-insensitively) is alive
    ///
    /// # Returns
    /// * `Ok(true)` / `Ok(false)` - The table was read
    /// * `Err(WatchdogError::ProbeFailure)` - The query itself failed
    async fn is_running(&self, executable_name: &str) -> Result<bool>;
}

/// Collapse a probe result to a plain boolean, treating a failed query as
/// "not running"
pub async fn probe_or_absent(probe: &dyn ProcessProbe, executable_name: &str) -> bool {
    match probe.is_running(executable_name).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!("Liveness probe for {} failed: {}", executable_name, e);
            false
        }
    }
}

/// Probe backed by `sysinfo`
///
/// Each query builds a fresh process table on the blocking pool, so a slow
/// or hung OS call only stalls the target that issued it.
#[derive(Debug, Default, Clone)]
pub struct SysinfoProbe;

impl SysinfoProbe {
    pub fn new() -> Self {
        Self
    }

    fn scan(executable_name: &str) -> Result<bool> {
        let wanted = executable_name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(false);
        }

        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let processes = system.processes();

        // A live host always has at least our own process in the table
        if processes.is_empty() {
            return Err(WatchdogError::ProbeFailure(
                "process table came back empty".to_string(),
            ));
        }

        Ok(processes
            .values()
            .filter(|p| p.status() != ProcessStatus::Zombie)
            .any(|p| Self::matches(p, &wanted)))
    }

    /// Compare against the image name, the executable's file name and the
    /// file name of argv[0]. The last one catches scripts run through an
    /// interpreter and names the kernel truncated.
    fn matches(process: &Process, wanted: &str) -> bool {
        let same = |name: &OsStr| name.to_string_lossy().to_lowercase() == wanted;

        if same(process.name()) {
            return true;
        }

        if process.exe().and_then(Path::file_name).is_some_and(same) {
            return true;
        }

        process
            .cmd()
            .first()
            .and_then(|arg0| Path::new(arg0).file_name())
            .is_some_and(same)
    }
}

#[async_trait]
impl ProcessProbe for SysinfoProbe {
    async fn is_running(&self, executable_name: &str) -> Result<bool> {
        let name = executable_name.to_string();

        tokio::task::spawn_blocking(move || Self::scan(&name))
            .await
            .map_err(|e| WatchdogError::ProbeFailure(format!("probe task failed: {}", e)))?
    }
}

/// Check whether a PID is still present in the process table
pub fn is_pid_alive(pid: u32) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::new(),
    );

    system
        .process(sys_pid)
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_executable_name() -> String {
        std::env::current_exe()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn test_finds_own_process() {
        let probe = SysinfoProbe::new();
        let running = probe.is_running(&own_executable_name()).await.unwrap();
        assert!(running);
    }

    #[tokio::test]
    async fn test_match_is_case_insensitive() {
        let probe = SysinfoProbe::new();
        let upper = own_executable_name().to_uppercase();
        assert!(probe.is_running(&upper).await.unwrap());
    }

    #[tokio::test]
    async fn test_absent_name_with_special_characters() {
        let probe = SysinfoProbe::new();
        let running = probe
            .is_running("no such \"app\" (x86) & friends.exe")
            .await
            .unwrap();
        assert!(!running);
    }

    #[tokio::test]
    async fn test_empty_name_is_never_running() {
        let probe = SysinfoProbe::new();
        assert!(!probe.is_running("   ").await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_or_absent_swallows_failure() {
        struct BrokenProbe;

        #[async_trait]
        impl ProcessProbe for BrokenProbe {
            async fn is_running(&self, _executable_name: &str) -> Result<bool> {
                Err(WatchdogError::ProbeFailure("tasklist exploded".to_string()))
            }
        }

        assert!(!probe_or_absent(&BrokenProbe, "app.exe").await);
    }

    #[test]
    fn test_is_pid_alive() {
        assert!(is_pid_alive(std::process::id()));
        assert!(!is_pid_alive(u32::MAX - 1));
    }
}
