// Process module - Liveness probing, relaunching and the per-target monitor loop

pub mod launcher;
pub mod probe;
mod scheduler;
pub mod types;

pub use launcher::{DetachedLauncher, ProcessLauncher};
pub use probe::{is_pid_alive, probe_or_absent, ProcessProbe, SysinfoProbe};
pub use scheduler::{MonitorScheduler, SchedulerConfig};
pub use types::{
    validate_interval, MonitorPhase, MonitorState, StatusEvent, TargetDescriptor, TargetId,
    TargetSnapshot, TargetStatus, MAX_CHECK_INTERVAL_SECS, MIN_CHECK_INTERVAL_SECS,
};
