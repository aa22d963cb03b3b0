// IPC module - Command channel between the CLI and a running watchdog

#[cfg(unix)]
pub mod client;
pub mod protocol;
#[cfg(unix)]
pub mod server;

#[cfg(unix)]
pub use client::IpcClient;
pub use protocol::{ControlCommand, ControlReply, Request, Response};
#[cfg(unix)]
pub use server::IpcServer;
