// IPC Server - Accepts control commands for a running watchdog

use crate::daemon::Watchdog;
use crate::error::{Result, WatchdogError};
use crate::ipc::{Request, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Listener on the control socket
///
/// The socket file is removed when the server is dropped.
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind the socket, replacing a stale one, readable by the owner only
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<Self> {
        let socket_path = path.as_ref().to_path_buf();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|e| {
                WatchdogError::IpcError(format!("Failed to remove existing socket: {}", e))
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| WatchdogError::IpcError(format!("Failed to bind to socket: {}", e)))?;

        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&socket_path, permissions).map_err(|e| {
                WatchdogError::IpcError(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        Ok(Self {
            socket_path,
            listener,
        })
    }

    /// Answer connections until `cancel` fires
    pub async fn serve(self, watchdog: Arc<Watchdog>, cancel: CancellationToken) -> Result<()> {
        loop {
            let stream = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        warn!("Failed to accept control connection: {}", e);
                        continue;
                    }
                },
            };

            let watchdog = Arc::clone(&watchdog);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &watchdog).await {
                    warn!("Control connection failed: {}", e);
                }
            });
        }

        debug!("Control socket {} closed", self.socket_path.display());
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Read one request, apply it and write the response
async fn handle_connection(stream: UnixStream, watchdog: &Watchdog) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();

    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(|e| WatchdogError::IpcError(format!("Failed to read request: {}", e)))?;

    let request: Request = serde_json::from_str(&request_line).map_err(|e| {
        WatchdogError::ProtocolError(format!("Failed to deserialize request: {}", e))
    })?;

    let response = match watchdog.execute(request.command).await {
        Ok(reply) => Response::success(request.id, reply),
        Err(e) => Response::error(request.id, e.to_string()),
    };

    let mut response_json = serde_json::to_string(&response).map_err(|e| {
        WatchdogError::ProtocolError(format!("Failed to serialize response: {}", e))
    })?;
    response_json.push('\n');

    write_half
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| WatchdogError::IpcError(format!("Failed to write response: {}", e)))?;
    write_half
        .flush()
        .await
        .map_err(|e| WatchdogError::IpcError(format!("Failed to flush stream: {}", e)))?;

    Ok(())
}
