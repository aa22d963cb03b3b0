// IPC Client - Sends control commands to a running watchdog

use crate::error::{Result, WatchdogError};
use crate::ipc::{ControlCommand, ControlReply, Request, Response};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Maximum number of connection attempts
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between connection attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct IpcClient {
    socket_path: PathBuf,
    request_id: AtomicU64,
}

impl IpcClient {
    pub fn with_socket_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            request_id: AtomicU64::new(1),
        }
    }

    /// Send one command and wait for the watchdog's reply
    ///
    /// Only connecting is retried; a command that reached the watchdog is
    /// never sent twice. A refusal comes back as `CommandRejected`.
    pub async fn send(&self, command: ControlCommand) -> Result<ControlReply> {
        let request_id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(request_id, command);

        let stream = self.connect_with_retry().await?;
        let response = Self::exchange(stream, &request).await?;

        if response.id != request_id {
            return Err(WatchdogError::ProtocolError(format!(
                "Response ID mismatch: expected {}, got {}",
                request_id, response.id
            )));
        }

        response.result.map_err(WatchdogError::CommandRejected)
    }

    async fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.connect().await {
                Ok(stream) => return Ok(stream),
                Err(WatchdogError::WatchdogNotRunning) => {
                    return Err(WatchdogError::WatchdogNotRunning)
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRY_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            WatchdogError::IpcError("Failed to connect after retries".to_string())
        }))
    }

    async fn connect(&self) -> Result<UnixStream> {
        if !self.socket_path.exists() {
            return Err(WatchdogError::WatchdogNotRunning);
        }

        UnixStream::connect(&self.socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                WatchdogError::WatchdogNotRunning
            } else {
                WatchdogError::IpcError(format!("Failed to connect to watchdog: {}", e))
            }
        })
    }

    async fn exchange(stream: UnixStream, request: &Request) -> Result<Response> {
        let (read_half, mut write_half) = stream.into_split();

        let mut request_json = serde_json::to_string(request).map_err(|e| {
            WatchdogError::ProtocolError(format!("Failed to serialize request: {}", e))
        })?;
        request_json.push('\n');

        write_half
            .write_all(request_json.as_bytes())
            .await
            .map_err(|e| WatchdogError::IpcError(format!("Failed to write request: {}", e)))?;
        write_half
            .flush()
            .await
            .map_err(|e| WatchdogError::IpcError(format!("Failed to flush stream: {}", e)))?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .await
            .map_err(|e| WatchdogError::IpcError(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&response_line).map_err(|e| {
            WatchdogError::ProtocolError(format!("Failed to deserialize response: {}", e))
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}
