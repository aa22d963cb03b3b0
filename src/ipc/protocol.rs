// Messages exchanged over the control socket, one JSON document per line

use crate::process::{TargetDescriptor, TargetSnapshot};
use serde::{Deserialize, Serialize};

/// Edits and queries a running watchdog accepts
///
/// `target` is an id, display name or executable path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    Add(TargetDescriptor),
    Remove { target: String },
    SetInterval { target: String, seconds: u64 },
    SetRelaunch { target: String, enabled: bool },
    Start { target: String },
    Stop { target: String },
    ClearLogs { target: String },
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlReply {
    Added(TargetDescriptor),
    Removed(TargetDescriptor),
    Updated(TargetDescriptor),
    Started(TargetSnapshot),
    Stopped(TargetSnapshot),
    /// Number of daily files deleted
    LogsCleared(usize),
    Targets(Vec<TargetSnapshot>),
}

/// Request message from client to watchdog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: ControlCommand,
}

/// Response message from watchdog to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ControlReply, String>,
}

impl Request {
    pub fn new(id: u64, command: ControlCommand) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, reply: ControlReply) -> Self {
        Self {
            id,
            result: Ok(reply),
        }
    }

    pub fn error(id: u64, error: String) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}
