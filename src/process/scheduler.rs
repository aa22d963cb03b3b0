use crate::error::{Result, WatchdogError};
use crate::logs::{LogLevel, LogTarget, TargetLogger};
use crate::process::launcher::ProcessLauncher;
use crate::process::probe::ProcessProbe;
use crate::process::types::{
    validate_interval, MonitorPhase, MonitorState, StatusEvent, TargetDescriptor, TargetId,
    TargetSnapshot, TargetStatus,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How many targets may be monitored at once
    pub max_targets: usize,
    /// Delay between a relaunch and its verification probe
    pub verify_delay: Duration,
    /// Capacity of the status event channel
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_targets: 5,
            verify_delay: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}

/// Recurring timer of one monitored target
struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct TargetEntry {
    descriptor: TargetDescriptor,
    state: MonitorState,
    run: Option<RunHandle>,
    /// Bumped on every start and stop; ticks of an older run are discarded
    generation: u64,
    /// Keeps ticks sequential across stop/start cycles
    tick_gate: Arc<tokio::sync::Mutex<()>>,
    /// Insertion order for listings
    order: u64,
}

impl TargetEntry {
    fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            descriptor: self.descriptor.clone(),
            status: self.state.status,
            phase: self.state.phase,
            last_checked_at: self.state.last_checked_at,
        }
    }
}

struct Shared {
    targets: Mutex<HashMap<TargetId, TargetEntry>>,
    next_order: Mutex<u64>,
    probe: Arc<dyn ProcessProbe>,
    launcher: Arc<dyn ProcessLauncher>,
    logger: Arc<TargetLogger>,
    events: broadcast::Sender<StatusEvent>,
    config: SchedulerConfig,
}

/// Owns every target's runtime state and its recurring check/relaunch loop
///
/// Each monitored target gets its own Tokio task, so a slow probe or launch
/// on one target never delays another. The id → entry map sits behind a
/// single synchronous mutex that is never held across an await.
///
/// Commands that start timers must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct MonitorScheduler {
    shared: Arc<Shared>,
}

impl MonitorScheduler {
    pub fn new(
        probe: Arc<dyn ProcessProbe>,
        launcher: Arc<dyn ProcessLauncher>,
        logger: Arc<TargetLogger>,
        config: SchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                targets: Mutex::new(HashMap::new()),
                next_order: Mutex::new(0),
                probe,
                launcher,
                logger,
                events,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn logger(&self) -> &Arc<TargetLogger> {
        &self.shared.logger
    }

    /// Register a new target for `executable_path`
    ///
    /// # Returns
    /// * `Ok(TargetDescriptor)` - The stored descriptor with its fresh id
    /// * `Err(WatchdogError::DuplicateTarget)` - Another target watches this path
    pub fn add_target<P: Into<PathBuf>>(
        &self,
        executable_path: P,
        check_interval_secs: u64,
    ) -> Result<TargetDescriptor> {
        let descriptor = TargetDescriptor::new(executable_path, check_interval_secs);
        self.add_descriptor(descriptor.clone())?;
        Ok(descriptor)
    }

    /// Register an existing descriptor, e.g. one loaded from the config store
    pub fn add_descriptor(&self, descriptor: TargetDescriptor) -> Result<()> {
        descriptor.validate()?;

        let mut targets = self.shared.lock();

        if targets.values().any(|e| {
            e.descriptor.executable_path == descriptor.executable_path
                || e.descriptor.id == descriptor.id
        }) {
            return Err(WatchdogError::DuplicateTarget(
                descriptor.executable_path.clone(),
            ));
        }

        debug!(
            "Registered target {} ({})",
            descriptor.display_name(),
            descriptor.id
        );

        let order = self.shared.next_order();
        targets.insert(
            descriptor.id,
            TargetEntry {
                descriptor,
                state: MonitorState::new(),
                run: None,
                generation: 0,
                tick_gate: Arc::new(tokio::sync::Mutex::new(())),
                order,
            },
        );

        Ok(())
    }

    /// Forget a stopped target
    pub fn remove_target(&self, id: TargetId) -> Result<TargetDescriptor> {
        let mut targets = self.shared.lock();

        let entry = targets
            .get(&id)
            .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))?;

        if entry.run.is_some() {
            return Err(WatchdogError::TargetBusy(
                entry.descriptor.display_name(),
                "stop monitoring before removing it".to_string(),
            ));
        }

        let entry = targets
            .remove(&id)
            .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))?;

        debug!("Removed target {} ({})", entry.descriptor.display_name(), id);
        Ok(entry.descriptor)
    }

    /// Arm the recurring check for a target
    ///
    /// Starting a target that is already monitored is a no-op. The first
    /// check runs one interval after this call.
    pub fn start(&self, id: TargetId) -> Result<()> {
        let max_targets = self.shared.config.max_targets;

        let (descriptor, event) = {
            let mut targets = self.shared.lock();
            let active = targets.values().filter(|e| e.run.is_some()).count();

            let entry = targets
                .get_mut(&id)
                .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))?;

            if entry.run.is_some() {
                return Ok(());
            }

            if active >= max_targets {
                return Err(WatchdogError::CapacityExceeded(max_targets));
            }

            entry.generation += 1;
            let cancel = CancellationToken::new();
            let task = tokio::spawn(run_target(
                Arc::downgrade(&self.shared),
                id,
                entry.generation,
                entry.descriptor.check_interval(),
                cancel.clone(),
                entry.tick_gate.clone(),
            ));

            entry.run = Some(RunHandle { cancel, task });
            entry.state.mark_started();

            (
                entry.descriptor.clone(),
                StatusEvent::from_state(id, &entry.state),
            )
        };

        info!(
            "Started monitoring {} every {}s",
            descriptor.display_name(),
            descriptor.check_interval_secs
        );

        let target = LogTarget::for_target(&descriptor);
        let logger = &self.shared.logger;
        logger.record(
            &target,
            LogLevel::System,
            format!(
                "Monitoring started for {} (interval {}s)",
                descriptor.display_name(),
                descriptor.check_interval_secs
            ),
        );
        logger.record(
            &target,
            LogLevel::Info,
            format!("Executable: {}", descriptor.executable_path.display()),
        );
        logger.record(
            &target,
            LogLevel::Info,
            format!("Working directory: {}", descriptor.working_directory().display()),
        );
        logger.record(
            &target,
            LogLevel::Info,
            format!("Log file: {}", logger.current_file(&target).display()),
        );

        self.shared.emit(event);
        Ok(())
    }

    /// Cancel a target's timer and reset its state
    ///
    /// Stopping a target that is not monitored is a no-op.
    pub fn stop(&self, id: TargetId) -> Result<()> {
        let stopped = {
            let mut targets = self.shared.lock();
            let entry = targets
                .get_mut(&id)
                .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))?;

            Self::stop_entry(id, entry)
        };

        if let Some((descriptor, event)) = stopped {
            self.after_stop(&descriptor, event);
        }

        Ok(())
    }

    /// Start every registered target that is not yet monitored
    ///
    /// Targets beyond the concurrency cap are skipped with a warning.
    /// Returns how many targets were started.
    pub fn start_all(&self) -> usize {
        let ids: Vec<TargetId> = self
            .list()
            .into_iter()
            .filter(|s| !s.is_monitoring())
            .map(|s| s.descriptor.id)
            .collect();

        let mut started = 0;
        for id in ids {
            match self.start(id) {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!("Could not start target {}: {}", id, e);
                    self.shared
                        .logger
                        .record_system(LogLevel::Warn, format!("Skipped target {}: {}", id, e));
                }
            }
        }

        if started > 0 {
            self.shared
                .logger
                .record_system(LogLevel::System, format!("Started monitoring {} target(s)", started));
        }

        started
    }

    /// Stop every monitored target
    ///
    /// Idempotent: a second call finds nothing to stop and writes nothing.
    /// Returns how many targets were stopped.
    pub fn stop_all(&self) -> usize {
        let stopped: Vec<(TargetDescriptor, StatusEvent)> = {
            let mut targets = self.shared.lock();
            targets
                .iter_mut()
                .filter_map(|(id, entry)| Self::stop_entry(*id, entry))
                .collect()
        };

        for (descriptor, event) in &stopped {
            self.after_stop(descriptor, event.clone());
        }

        if !stopped.is_empty() {
            self.shared.logger.record_system(
                LogLevel::System,
                format!("Stopped monitoring {} target(s)", stopped.len()),
            );
        }

        stopped.len()
    }

    /// Toggle relaunching; takes effect from the next tick
    pub fn set_auto_relaunch(&self, id: TargetId, auto_relaunch: bool) -> Result<TargetDescriptor> {
        let mut targets = self.shared.lock();
        let entry = targets
            .get_mut(&id)
            .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))?;

        entry.descriptor.auto_relaunch = auto_relaunch;
        Ok(entry.descriptor.clone())
    }

    /// Change the check interval of a stopped target
    pub fn set_interval(&self, id: TargetId, check_interval_secs: u64) -> Result<TargetDescriptor> {
        let mut targets = self.shared.lock();
        let entry = targets
            .get_mut(&id)
            .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))?;

        if entry.run.is_some() {
            return Err(WatchdogError::TargetBusy(
                entry.descriptor.display_name(),
                "stop monitoring before changing the interval".to_string(),
            ));
        }

        validate_interval(check_interval_secs)?;

        entry.descriptor.check_interval_secs = check_interval_secs;
        Ok(entry.descriptor.clone())
    }

    pub fn snapshot(&self, id: TargetId) -> Result<TargetSnapshot> {
        self.shared
            .lock()
            .get(&id)
            .map(TargetEntry::snapshot)
            .ok_or_else(|| WatchdogError::TargetNotFound(id.to_string()))
    }

    /// Every target in registration order
    pub fn list(&self) -> Vec<TargetSnapshot> {
        let targets = self.shared.lock();
        let mut entries: Vec<&TargetEntry> = targets.values().collect();
        entries.sort_by_key(|e| e.order);
        entries.into_iter().map(TargetEntry::snapshot).collect()
    }

    pub fn descriptors(&self) -> Vec<TargetDescriptor> {
        self.list().into_iter().map(|s| s.descriptor).collect()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.shared.events.subscribe()
    }

    pub fn active_count(&self) -> usize {
        self.shared
            .lock()
            .values()
            .filter(|e| e.run.is_some())
            .count()
    }

    fn stop_entry(id: TargetId, entry: &mut TargetEntry) -> Option<(TargetDescriptor, StatusEvent)> {
        let run = entry.run.take()?;

        // The task finishes an in-flight tick on its own; only the timer goes
        run.cancel.cancel();
        drop(run.task);

        entry.generation += 1;
        entry.state.mark_stopped();

        Some((
            entry.descriptor.clone(),
            StatusEvent::from_state(id, &entry.state),
        ))
    }

    fn after_stop(&self, descriptor: &TargetDescriptor, event: StatusEvent) {
        info!("Stopped monitoring {}", descriptor.display_name());
        self.shared.logger.record_target(
            descriptor,
            LogLevel::System,
            format!("Monitoring stopped for {}", descriptor.display_name()),
        );
        self.shared.emit(event);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<TargetId, TargetEntry>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_order(&self) -> u64 {
        let mut next = self.next_order.lock().unwrap_or_else(PoisonError::into_inner);
        *next += 1;
        *next
    }

    fn emit(&self, event: StatusEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Apply `update` if `generation` is still the target's current run
    fn update_state<F>(&self, id: TargetId, generation: u64, update: F) -> Option<StatusEvent>
    where
        F: FnOnce(&mut MonitorState),
    {
        let mut targets = self.lock();
        let entry = targets.get_mut(&id)?;

        if entry.generation != generation || entry.run.is_none() {
            return None;
        }

        update(&mut entry.state);
        Some(StatusEvent::from_state(id, &entry.state))
    }

    fn set_phase(&self, id: TargetId, generation: u64, phase: MonitorPhase) {
        self.update_state(id, generation, |state| state.phase = phase);
    }

    /// Record an observation and publish it; a stale run publishes nothing
    fn observe(&self, id: TargetId, generation: u64, status: Option<TargetStatus>, phase: MonitorPhase) {
        let event = self.update_state(id, generation, |state| {
            state.mark_checked(status);
            state.phase = phase;
        });

        if let Some(event) = event {
            self.emit(event);
        }
    }

    /// One probe-and-react cycle
    async fn run_tick(self: &Arc<Self>, id: TargetId, generation: u64) {
        let descriptor = {
            let mut targets = self.lock();
            let Some(entry) = targets.get_mut(&id) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            entry.state.phase = MonitorPhase::Checking;
            entry.descriptor.clone()
        };

        let name = descriptor.process_name();
        let logger = &self.logger;

        match self.probe.is_running(&name).await {
            Ok(true) => {
                logger.record_target(&descriptor, LogLevel::Check, format!("{} is running", name));
                self.observe(id, generation, Some(TargetStatus::Running), MonitorPhase::ObservedRunning);
            }
            Ok(false) => {
                logger.record_target(&descriptor, LogLevel::Warn, format!("{} is not running", name));
                self.observe(id, generation, Some(TargetStatus::NotRunning), MonitorPhase::ObservedAbsent);

                if descriptor.auto_relaunch {
                    self.relaunch(id, generation, &descriptor).await;
                }
            }
            Err(e) => {
                logger.record_target(
                    &descriptor,
                    LogLevel::Error,
                    format!("Process check for {} failed: {}", name, e),
                );
                self.observe(id, generation, None, MonitorPhase::Idle);
            }
        }
    }

    async fn relaunch(self: &Arc<Self>, id: TargetId, generation: u64, descriptor: &TargetDescriptor) {
        let working_directory = descriptor.working_directory();
        self.set_phase(id, generation, MonitorPhase::Relaunching);

        match self
            .launcher
            .launch(&descriptor.executable_path, &working_directory)
            .await
        {
            Ok(()) => {
                self.logger.record_target(
                    descriptor,
                    LogLevel::Info,
                    format!(
                        "Relaunched {} from {}",
                        descriptor.display_name(),
                        descriptor.executable_path.display()
                    ),
                );
                self.set_phase(id, generation, MonitorPhase::VerifyPending);
                self.schedule_verification(descriptor.clone());
            }
            Err(e) => {
                self.logger.record_target(
                    descriptor,
                    LogLevel::Error,
                    format!("Failed to relaunch {}: {}", descriptor.display_name(), e),
                );
                self.set_phase(id, generation, MonitorPhase::ObservedAbsent);
            }
        }
    }

    /// One-shot delayed probe after a relaunch; reports only, never touches state
    fn schedule_verification(self: &Arc<Self>, descriptor: TargetDescriptor) {
        let weak = Arc::downgrade(self);
        let delay = self.config.verify_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(shared) = weak.upgrade() else {
                return;
            };

            let name = descriptor.process_name();
            let running = shared.probe.is_running(&name).await;

            if !shared.lock().contains_key(&descriptor.id) {
                debug!(
                    "Discarding verification of {}: target was removed",
                    descriptor.display_name()
                );
                return;
            }

            match running {
                Ok(true) => shared.logger.record_target(
                    &descriptor,
                    LogLevel::Success,
                    format!("{} is running again", name),
                ),
                Ok(false) => shared.logger.record_target(
                    &descriptor,
                    LogLevel::Error,
                    format!("{} is still not running after relaunch", name),
                ),
                Err(e) => shared.logger.record_target(
                    &descriptor,
                    LogLevel::Error,
                    format!("Verification of {} failed: {}", name, e),
                ),
            }
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let targets = self.targets.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in targets.values_mut() {
            if let Some(run) = entry.run.take() {
                run.cancel.cancel();
            }
        }
    }
}

/// Timer loop of one target run
async fn run_target(
    shared: Weak<Shared>,
    id: TargetId,
    generation: u64,
    period: Duration,
    cancel: CancellationToken,
    tick_gate: Arc<tokio::sync::Mutex<()>>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };

        let _gate = tick_gate.lock().await;
        if cancel.is_cancelled() {
            break;
        }

        shared.run_tick(id, generation).await;
    }

    debug!("Timer for target {} (run {}) finished", id, generation);
}
