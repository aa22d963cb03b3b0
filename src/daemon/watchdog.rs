use crate::config::WatchdogConfig;
use crate::error::{Result, WatchdogError};
use crate::ipc::{ControlCommand, ControlReply};
use crate::logs::{LogEntry, LogLevel, LogPageRequest, LogTarget, LogView, TargetLogger};
use crate::process::{
    DetachedLauncher, MonitorScheduler, ProcessLauncher, ProcessProbe, StatusEvent,
    SysinfoProbe, TargetDescriptor, TargetId, TargetSnapshot,
};
use crate::state::{ConfigStore, FileConfigStore};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Command surface used by the shell
///
/// Wraps the scheduler, the config store and the logger. Every edit of the
/// target set is saved right away; when saving fails the in-memory change
/// stays live and `ConfigPersistError` is returned.
pub struct Watchdog {
    config: WatchdogConfig,
    scheduler: MonitorScheduler,
    store: Arc<dyn ConfigStore>,
    logger: Arc<TargetLogger>,
    /// Serialises edit + save so saves land in edit order
    persist_lock: Mutex<()>,
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        store: Arc<dyn ConfigStore>,
        probe: Arc<dyn ProcessProbe>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self> {
        config.validate()?;

        let logger = Arc::new(TargetLogger::with_capacity(
            &config.log_dir,
            config.event_capacity,
        )?);
        let scheduler = MonitorScheduler::new(probe, launcher, logger.clone(), config.scheduler());

        Ok(Self {
            config,
            scheduler,
            store,
            logger,
            persist_lock: Mutex::new(()),
        })
    }

    /// Watchdog backed by the real OS probe/launcher and the configured targets file
    pub fn with_defaults(config: WatchdogConfig) -> Result<Self> {
        let store = Arc::new(FileConfigStore::new(&config.targets_file));
        Self::new(
            config,
            store,
            Arc::new(SysinfoProbe::new()),
            Arc::new(DetachedLauncher::new()),
        )
    }

    /// Register every stored target
    ///
    /// Entries the scheduler rejects are skipped with a warning. Returns the
    /// number of targets registered.
    pub fn load(&self) -> Result<usize> {
        let descriptors = self.store.load()?;
        let mut loaded = 0;

        for descriptor in descriptors {
            let name = descriptor.display_name();
            match self.scheduler.add_descriptor(descriptor) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping stored target {}: {}", name, e),
            }
        }

        info!("Loaded {} target(s)", loaded);
        Ok(loaded)
    }

    /// Add a target; `check_interval_secs` falls back to the configured default
    pub fn add_target<P: Into<PathBuf>>(
        &self,
        executable_path: P,
        check_interval_secs: Option<u64>,
    ) -> Result<TargetDescriptor> {
        let interval = check_interval_secs.unwrap_or(self.config.default_interval_secs);
        let descriptor = TargetDescriptor::new(executable_path, interval);
        self.add_descriptor(descriptor.clone())?;
        Ok(descriptor)
    }

    pub fn add_descriptor(&self, descriptor: TargetDescriptor) -> Result<()> {
        self.edit(|scheduler| scheduler.add_descriptor(descriptor))
    }

    pub fn remove_target(&self, id: TargetId) -> Result<TargetDescriptor> {
        self.edit(|scheduler| scheduler.remove_target(id))
    }

    pub fn set_interval(&self, id: TargetId, check_interval_secs: u64) -> Result<TargetDescriptor> {
        self.edit(|scheduler| scheduler.set_interval(id, check_interval_secs))
    }

    pub fn set_auto_relaunch(&self, id: TargetId, auto_relaunch: bool) -> Result<TargetDescriptor> {
        self.edit(|scheduler| scheduler.set_auto_relaunch(id, auto_relaunch))
    }

    pub fn start(&self, id: TargetId) -> Result<()> {
        self.scheduler.start(id)
    }

    pub fn stop(&self, id: TargetId) -> Result<()> {
        self.scheduler.stop(id)
    }

    pub fn start_all(&self) -> usize {
        self.scheduler.start_all()
    }

    pub fn stop_all(&self) -> usize {
        self.scheduler.stop_all()
    }

    pub fn list(&self) -> Vec<TargetSnapshot> {
        self.scheduler.list()
    }

    pub fn snapshot(&self, id: TargetId) -> Result<TargetSnapshot> {
        self.scheduler.snapshot(id)
    }

    /// Find a target by id, display name or executable path
    pub fn resolve(&self, key: &str) -> Result<TargetId> {
        if let Ok(id) = key.parse::<TargetId>() {
            return self.scheduler.snapshot(id).map(|_| id);
        }

        let matches: Vec<TargetId> = self
            .scheduler
            .descriptors()
            .into_iter()
            .filter(|d| {
                d.display_name().eq_ignore_ascii_case(key)
                    || d.executable_path == PathBuf::from(key)
            })
            .map(|d| d.id)
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(WatchdogError::TargetNotFound(key.to_string())),
            _ => Err(WatchdogError::TargetNotFound(format!(
                "{} is ambiguous, use the target id",
                key
            ))),
        }
    }

    /// Log view of a target, or the "no target selected" view
    pub async fn read_logs(
        &self,
        id: Option<TargetId>,
        request: LogPageRequest,
    ) -> Result<LogView> {
        let descriptor = match id {
            Some(id) => Some(self.scheduler.snapshot(id)?.descriptor),
            None => None,
        };

        self.logger.read_for(descriptor.as_ref(), request).await
    }

    /// Delete a target's log files
    pub async fn clear_logs(&self, id: TargetId) -> Result<usize> {
        let descriptor = self.scheduler.snapshot(id)?.descriptor;
        self.logger.clear(&LogTarget::for_target(&descriptor)).await
    }

    /// Apply one control command
    ///
    /// Targets are named by id, display name or executable path, the same
    /// keys `resolve` accepts.
    pub async fn execute(&self, command: ControlCommand) -> Result<ControlReply> {
        match command {
            ControlCommand::Add(descriptor) => {
                self.add_descriptor(descriptor.clone())?;
                Ok(ControlReply::Added(descriptor))
            }
            ControlCommand::Remove { target } => {
                let id = self.resolve(&target)?;
                self.remove_target(id).map(ControlReply::Removed)
            }
            ControlCommand::SetInterval { target, seconds } => {
                let id = self.resolve(&target)?;
                self.set_interval(id, seconds).map(ControlReply::Updated)
            }
            ControlCommand::SetRelaunch { target, enabled } => {
                let id = self.resolve(&target)?;
                self.set_auto_relaunch(id, enabled).map(ControlReply::Updated)
            }
            ControlCommand::Start { target } => {
                let id = self.resolve(&target)?;
                self.start(id)?;
                self.snapshot(id).map(ControlReply::Started)
            }
            ControlCommand::Stop { target } => {
                let id = self.resolve(&target)?;
                self.stop(id)?;
                self.snapshot(id).map(ControlReply::Stopped)
            }
            ControlCommand::ClearLogs { target } => {
                let id = self.resolve(&target)?;
                self.clear_logs(id).await.map(ControlReply::LogsCleared)
            }
            ControlCommand::List => Ok(ControlReply::Targets(self.list())),
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.scheduler.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.logger.subscribe()
    }

    pub fn scheduler(&self) -> &MonitorScheduler {
        &self.scheduler
    }

    pub fn logger(&self) -> &Arc<TargetLogger> {
        &self.logger
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Monitor every registered target until `shutdown` resolves, then stop all
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let targets = self.scheduler.list().len();
        self.logger.record_system(
            LogLevel::System,
            format!("Watchdog started with {} target(s)", targets),
        );

        let started = self.start_all();
        info!("Monitoring {} of {} target(s)", started, targets);

        shutdown.await;

        info!("Shutting down watchdog gracefully...");
        self.stop_all();
        self.logger
            .record_system(LogLevel::System, "Watchdog stopped".to_string());
        self.logger.flush().await;

        Ok(())
    }

    /// Run until SIGINT/SIGTERM (Ctrl+C elsewhere)
    pub async fn run_until_signal(&self) -> Result<()> {
        self.run(shutdown_signal()).await
    }

    /// Apply one edit and save the resulting target set
    fn edit<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&MonitorScheduler) -> Result<T>,
    {
        let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let value = apply(&self.scheduler)?;
        self.persist()?;
        Ok(value)
    }

    fn persist(&self) -> Result<()> {
        self.store
            .save(&self.scheduler.descriptors())
            .map_err(|e| match e {
                persist @ WatchdogError::ConfigPersistError(_) => persist,
                other => WatchdogError::ConfigPersistError(other.to_string()),
            })
            .inspect_err(|e| error!("{}", e))
    }
}

/// Resolves on the first termination signal
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
