// Daemon module - Long-running watchdog service and its single-instance guard

pub mod pid;
mod watchdog;

pub use pid::{PidFile, PidGuard};
pub use watchdog::{shutdown_signal, Watchdog};
