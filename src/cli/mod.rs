// CLI module - User-facing command-line interface

mod output;

use crate::config::{legacy, WatchdogConfig};
use crate::daemon::{PidFile, Watchdog};
use crate::error::{Result, WatchdogError};
#[cfg(unix)]
use crate::ipc::{IpcClient, IpcServer};
use crate::ipc::{ControlCommand, ControlReply};
use crate::logs::{LogPageRequest, LogView};
use crate::process::{probe_or_absent, SysinfoProbe, TargetDescriptor};
use clap::{ArgAction, Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// procwatch - keeps executables running by checking and relaunching them
///
/// While `procwatch run` is active, edits made from another shell are sent
/// to it over its control socket.
#[derive(Parser)]
#[command(name = "procwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file (.toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor every registered target until interrupted
    Run,

    /// Register an executable to watch
    Add {
        /// Absolute path of the executable
        path: PathBuf,

        /// Seconds between checks (5-3600)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Only report absence, never relaunch
        #[arg(long)]
        no_relaunch: bool,

        /// Name used in listings and log file names
        #[arg(short, long)]
        name: Option<String>,

        /// Working directory for relaunches (defaults to the executable's directory)
        #[arg(short = 'w', long)]
        cwd: Option<PathBuf>,
    },

    /// Forget a target (it must not be monitored)
    Remove {
        /// Target id, name or path
        target: String,
    },

    /// Begin monitoring a target in the running watchdog
    Start {
        /// Target id, name or path
        target: String,
    },

    /// Stop monitoring a target in the running watchdog
    Stop {
        /// Target id, name or path
        target: String,
    },

    /// List registered targets and whether they are running now
    List,

    /// Show a target's log, newest first
    Logs {
        /// Target id, name or path
        target: Option<String>,

        /// Number of lines to display
        #[arg(short, long, default_value = "50")]
        lines: usize,

        /// Skip this many of the newest lines
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Change a target's check interval
    SetInterval {
        /// Target id, name or path
        target: String,

        /// Seconds between checks (5-3600)
        seconds: u64,
    },

    /// Turn relaunching on or off for a target
    SetRelaunch {
        /// Target id, name or path
        target: String,

        /// true or false
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },

    /// Delete a target's log files
    ClearLogs {
        /// Target id, name or path
        target: String,
    },

    /// Import a target from a legacy INI configuration file
    ///
    /// A `processName` that differs from the executable's file name becomes
    /// the display name only. Liveness is always checked against the
    /// executable's file name.
    Import {
        /// INI file with a [Process] section
        file: PathBuf,
    },
}

impl Cli {
    /// Parse arguments and execute the command
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute().await
    }

    async fn execute(self) -> Result<()> {
        let config = WatchdogConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Run => run_watchdog(config).await,

            Commands::Add {
                path,
                interval,
                no_relaunch,
                name,
                cwd,
            } => {
                let mut descriptor =
                    TargetDescriptor::new(path, interval.unwrap_or(config.default_interval_secs))
                        .with_auto_relaunch(!no_relaunch);
                descriptor.display_name = name;
                descriptor.working_directory = cwd;

                match dispatch(config, ControlCommand::Add(descriptor)).await? {
                    ControlReply::Added(added) => {
                        output::print_added(&added);
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::Remove { target } => {
                match dispatch(config, ControlCommand::Remove { target }).await? {
                    ControlReply::Removed(removed) => {
                        output::print_success_msg(&format!("Removed {}", removed.display_name()));
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::Start { target } => {
                match dispatch(config, ControlCommand::Start { target }).await? {
                    ControlReply::Started(snapshot) => {
                        output::print_success_msg(&format!(
                            "Monitoring {}",
                            snapshot.descriptor.display_name()
                        ));
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::Stop { target } => {
                match dispatch(config, ControlCommand::Stop { target }).await? {
                    ControlReply::Stopped(snapshot) => {
                        output::print_success_msg(&format!(
                            "Stopped monitoring {}",
                            snapshot.descriptor.display_name()
                        ));
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::List => {
                let targets = match dispatch(config, ControlCommand::List).await? {
                    ControlReply::Targets(targets) => targets,
                    other => return Err(unexpected_reply(other)),
                };

                let probe = SysinfoProbe::new();
                let mut running = HashMap::new();
                for snapshot in &targets {
                    let descriptor = &snapshot.descriptor;
                    let alive = probe_or_absent(&probe, &descriptor.process_name()).await;
                    running.insert(descriptor.id, alive);
                }

                output::print_target_table(&targets, &running);
                Ok(())
            }

            Commands::Logs {
                target,
                lines,
                offset,
            } => {
                let watchdog = open(config)?;
                let id = match target {
                    Some(ref key) => Some(watchdog.resolve(key)?),
                    None => None,
                };

                match watchdog
                    .read_logs(id, LogPageRequest::new(lines, offset))
                    .await?
                {
                    LogView::NoTargetSelected => {
                        output::print_info("No target selected; pass a target id, name or path")
                    }
                    LogView::Lines(page) => output::print_log_page(&page),
                }
                Ok(())
            }

            Commands::SetInterval { target, seconds } => {
                match dispatch(config, ControlCommand::SetInterval { target, seconds }).await? {
                    ControlReply::Updated(updated) => {
                        output::print_success_msg(&format!(
                            "{} is now checked every {}",
                            updated.display_name(),
                            output::format_interval(updated.check_interval_secs)
                        ));
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::SetRelaunch { target, enabled } => {
                match dispatch(config, ControlCommand::SetRelaunch { target, enabled }).await? {
                    ControlReply::Updated(updated) => {
                        output::print_success_msg(&format!(
                            "Auto-relaunch {} for {}",
                            if updated.auto_relaunch { "enabled" } else { "disabled" },
                            updated.display_name()
                        ));
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::ClearLogs { target } => {
                match dispatch(config, ControlCommand::ClearLogs { target }).await? {
                    ControlReply::LogsCleared(removed) => {
                        output::print_success_msg(&format!("Deleted {} log file(s)", removed));
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }

            Commands::Import { file } => {
                let descriptor = legacy::import_ini(&file, config.default_interval_secs)?;
                match dispatch(config, ControlCommand::Add(descriptor)).await? {
                    ControlReply::Added(added) => {
                        output::print_added(&added);
                    }
                    other => return Err(unexpected_reply(other)),
                }
                Ok(())
            }
        }
    }
}

/// Build a watchdog over the stored targets
fn open(config: WatchdogConfig) -> Result<Watchdog> {
    let watchdog = Watchdog::with_defaults(config)?;
    watchdog.load()?;
    Ok(watchdog)
}

/// Apply a command through the running watchdog, or locally when none runs
///
/// Starting and stopping only make sense inside a running watchdog.
async fn dispatch(config: WatchdogConfig, command: ControlCommand) -> Result<ControlReply> {
    if let Some(pid) = PidFile::with_path(&config.pid_file).running_instance() {
        return send_to_running(&config, pid, command).await;
    }

    match command {
        ControlCommand::Start { .. } | ControlCommand::Stop { .. } => {
            Err(WatchdogError::WatchdogNotRunning)
        }
        command => open(config)?.execute(command).await,
    }
}

fn unexpected_reply(reply: ControlReply) -> WatchdogError {
    WatchdogError::ProtocolError(format!("Unexpected reply: {:?}", reply))
}

#[cfg(unix)]
async fn send_to_running(
    config: &WatchdogConfig,
    _pid: u32,
    command: ControlCommand,
) -> Result<ControlReply> {
    IpcClient::with_socket_path(&config.socket_path)
        .send(command)
        .await
}

#[cfg(not(unix))]
async fn send_to_running(
    _config: &WatchdogConfig,
    pid: u32,
    _command: ControlCommand,
) -> Result<ControlReply> {
    Err(WatchdogError::AlreadyRunning(pid))
}

async fn run_watchdog(config: WatchdogConfig) -> Result<()> {
    let _pid_guard = PidFile::with_path(&config.pid_file).acquire()?;
    let watchdog = Arc::new(open(config)?);

    if watchdog.list().is_empty() {
        return Err(WatchdogError::ConfigError(
            "no targets registered; add one with `procwatch add <path>`".to_string(),
        ));
    }

    let control = CancellationToken::new();
    #[cfg(unix)]
    let server = {
        let server = IpcServer::bind(&watchdog.config().socket_path)?;
        tokio::spawn(server.serve(Arc::clone(&watchdog), control.clone()))
    };

    let mut events = watchdog.subscribe_status();
    let names = Arc::clone(&watchdog);
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let name = names
                        .snapshot(event.target_id)
                        .map(|s| s.descriptor.display_name())
                        .unwrap_or_else(|_| "removed target".to_string());
                    output::print_status_event(&name, &event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Status display skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    output::print_info("Watching targets, press Ctrl+C to stop");
    let result = watchdog.run_until_signal().await;

    control.cancel();
    #[cfg(unix)]
    {
        match server.await {
            Ok(Err(e)) => tracing::warn!("Control socket failed: {}", e),
            Err(e) => tracing::warn!("Control socket task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    printer.abort();

    result
}
