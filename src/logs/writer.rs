use crate::error::{Result, WatchdogError};
use crate::logs::reader::{self, LogPage, LogPageRequest, LogView};
use crate::process::{TargetDescriptor, TargetId};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Default capacity of the live log stream
const DEFAULT_STREAM_CAPACITY: usize = 256;

/// File-name stem of the daily system log
pub const SYSTEM_LOG_STEM: &str = "_system";

/// Timestamp layout used at the start of every line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Severity/category tag written between brackets on every line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Check,
    Info,
    Warn,
    Error,
    Success,
    System,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Check => "CHECK",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
            LogLevel::System => "SYSTEM",
            LogLevel::Debug => "DEBUG",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "CHECK" => Some(LogLevel::Check),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "SUCCESS" => Some(LogLevel::Success),
            "SYSTEM" => Some(LogLevel::System),
            "DEBUG" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which sink an entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogTarget {
    System,
    Target { id: TargetId, name: String },
}

impl LogTarget {
    pub fn for_target(descriptor: &TargetDescriptor) -> Self {
        LogTarget::Target {
            id: descriptor.id,
            name: descriptor.display_name(),
        }
    }

    pub fn target_id(&self) -> Option<TargetId> {
        match self {
            LogTarget::System => None,
            LogTarget::Target { id, .. } => Some(*id),
        }
    }

    /// Stem of the daily file this target writes to
    ///
    /// Targets get `<display name>-<first 8 id chars>` so two executables
    /// sharing a file name never share a log.
    pub fn file_stem(&self) -> String {
        match self {
            LogTarget::System => SYSTEM_LOG_STEM.to_string(),
            LogTarget::Target { id, name } => {
                let short: String = id.to_string().chars().take(8).collect();
                format!("{}-{}", sanitize_file_stem(name), short)
            }
        }
    }
}

/// One appended log record, also pushed to live observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub target: LogTarget,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// Render as `[timestamp] [LEVEL] message`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.message
        )
    }
}

/// Work handed to the file writer task
enum WriteOp {
    Append {
        stem: String,
        path: PathBuf,
        line: String,
    },
    Clear {
        stem: String,
        reply: oneshot::Sender<Result<usize>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Append-only daily log sink for targets and for the watchdog itself
///
/// `record` never blocks and never fails outward. Lines are queued to a
/// writer task that owns every open file, so appends from concurrent ticks
/// never interleave. An I/O error is reported on the `tracing` console
/// channel and the entry is still delivered to live subscribers.
///
/// Must be created inside a tokio runtime.
pub struct TargetLogger {
    /// Directory holding every daily file
    log_dir: PathBuf,
    writer: mpsc::UnboundedSender<WriteOp>,
    /// Live stream of entries
    events: broadcast::Sender<LogEntry>,
}

impl TargetLogger {
    /// Create a logger rooted at `log_dir`, creating the directory
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        Self::with_capacity(log_dir, DEFAULT_STREAM_CAPACITY)
    }

    /// Create a logger with a custom live-stream capacity
    pub fn with_capacity<P: AsRef<Path>>(log_dir: P, capacity: usize) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            WatchdogError::LogError(format!("Log writer needs a tokio runtime: {}", e))
        })?;

        std::fs::create_dir_all(&log_dir)
            .map_err(|e| WatchdogError::LogError(format!("Failed to create log directory: {}", e)))?;

        let (writer, ops) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(log_dir.clone(), ops));

        let (events, _) = broadcast::channel(capacity.max(1));

        Ok(Self {
            log_dir,
            writer,
            events,
        })
    }

    /// Queue one entry for its daily file and publish it
    pub fn record(&self, target: &LogTarget, level: LogLevel, message: impl Into<String>) {
        let message: String = message.into();
        let entry = LogEntry {
            timestamp: Local::now(),
            target: target.clone(),
            level,
            // One entry is always one line
            message: message.replace(['\r', '\n'], " "),
        };

        let op = WriteOp::Append {
            stem: target.file_stem(),
            path: self.file_for(target, entry.timestamp.date_naive()),
            line: entry.format_line(),
        };
        if self.writer.send(op).is_err() {
            tracing::error!("Log writer has stopped, dropping: {}", entry.format_line());
        }

        Self::mirror_to_console(target, level, &entry.message);

        // No subscribers is not an error
        let _ = self.events.send(entry);
    }

    pub fn record_target(
        &self,
        descriptor: &TargetDescriptor,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        self.record(&LogTarget::for_target(descriptor), level, message);
    }

    pub fn record_system(&self, level: LogLevel, message: impl Into<String>) {
        self.record(&LogTarget::System, level, message);
    }

    /// Wait until every entry recorded so far is on disk
    pub async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.writer.send(WriteOp::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }

    /// Subscribe to every entry recorded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.events.subscribe()
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the daily file for `target` on `date`
    pub fn file_for(&self, target: &LogTarget, date: NaiveDate) -> PathBuf {
        self.log_dir
            .join(format!("{}-{}.log", target.file_stem(), date.format("%Y-%m-%d")))
    }

    /// Path of today's file for `target`
    pub fn current_file(&self, target: &LogTarget) -> PathBuf {
        self.file_for(target, Local::now().date_naive())
    }

    /// Most recent lines of a target's logs, newest first
    pub async fn read_recent(&self, target: &LogTarget, request: LogPageRequest) -> Result<LogPage> {
        self.flush().await;
        reader::read_recent(&self.log_dir, &target.file_stem(), request).await
    }

    /// Log view for the selected target, or the "no target selected" sentinel
    pub async fn read_for(
        &self,
        descriptor: Option<&TargetDescriptor>,
        request: LogPageRequest,
    ) -> Result<LogView> {
        match descriptor {
            None => Ok(LogView::NoTargetSelected),
            Some(descriptor) => Ok(LogView::Lines(
                self.read_recent(&LogTarget::for_target(descriptor), request)
                    .await?,
            )),
        }
    }

    /// Delete every daily file of a target, returning how many were removed
    pub async fn clear(&self, target: &LogTarget) -> Result<usize> {
        let (reply, removed) = oneshot::channel();
        self.writer
            .send(WriteOp::Clear {
                stem: target.file_stem(),
                reply,
            })
            .map_err(|_| WatchdogError::LogError("Log writer has stopped".to_string()))?;

        removed
            .await
            .map_err(|_| WatchdogError::LogError("Log writer has stopped".to_string()))?
    }

    fn mirror_to_console(target: &LogTarget, level: LogLevel, message: &str) {
        let source = match target {
            LogTarget::System => "system",
            LogTarget::Target { name, .. } => name.as_str(),
        };

        match level {
            LogLevel::Error => tracing::error!(target: "procwatch::activity", "[{}] {}", source, message),
            LogLevel::Warn => tracing::warn!(target: "procwatch::activity", "[{}] {}", source, message),
            LogLevel::Debug => tracing::debug!(target: "procwatch::activity", "[{}] {}", source, message),
            _ => tracing::info!(target: "procwatch::activity", "[{}] [{}] {}", source, level, message),
        }
    }
}

/// Owns the open daily files, keyed by stem
async fn run_writer(log_dir: PathBuf, mut ops: mpsc::UnboundedReceiver<WriteOp>) {
    let mut open: HashMap<String, (PathBuf, File)> = HashMap::new();

    while let Some(op) = ops.recv().await {
        match op {
            WriteOp::Append { stem, path, line } => {
                if let Err(e) = append_line(&mut open, stem, &path, &line).await {
                    tracing::error!("Failed to write log file {}: {}", path.display(), e);
                }
            }
            WriteOp::Clear { stem, reply } => {
                open.remove(&stem);
                let _ = reply.send(remove_daily_files(&log_dir, &stem).await);
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn append_line(
    open: &mut HashMap<String, (PathBuf, File)>,
    stem: String,
    path: &Path,
    line: &str,
) -> std::io::Result<()> {
    // A new day means a new file
    let reopen = open.get(&stem).map_or(true, |(current, _)| current != path);
    if reopen {
        open.remove(&stem);
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        open.insert(stem.clone(), (path.to_path_buf(), file));
    }

    let Some((_, file)) = open.get_mut(&stem) else {
        return Ok(());
    };

    let written = write_line(file, line).await;
    if written.is_err() {
        open.remove(&stem);
    }
    written
}

async fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

async fn remove_daily_files(log_dir: &Path, stem: &str) -> Result<usize> {
    let files = reader::daily_files(log_dir, stem).await?;

    for (_, path) in &files {
        tokio::fs::remove_file(path).await.map_err(|e| {
            WatchdogError::LogError(format!("Failed to remove {}: {}", path.display(), e))
        })?;
    }

    Ok(files.len())
}

/// Make a display name safe to use as a file-name stem
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(name: &str) -> LogTarget {
        LogTarget::Target {
            id: TargetId::new(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_appends_formatted_line() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let app = target("app.exe");

        logger.record(&app, LogLevel::Check, "app.exe is running");
        logger.record(&app, LogLevel::Warn, "app.exe is not running");
        logger.flush().await;

        let content = std::fs::read_to_string(logger.current_file(&app)).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("[CHECK] app.exe is running"));
        assert!(lines[1].contains("[WARN]"));
    }

    #[tokio::test]
    async fn test_record_only_queues_the_write() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let app = target("app.exe");

        // The writer task has not run yet on this single-threaded runtime
        logger.record(&app, LogLevel::Check, "queued");
        assert!(!logger.current_file(&app).exists());

        logger.flush().await;
        let content = std::fs::read_to_string(logger.current_file(&app)).unwrap();
        assert!(content.ends_with("[CHECK] queued\n"));
    }

    #[tokio::test]
    async fn test_file_name_uses_display_name_id_and_date() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let server = LogTarget::Target {
            id: "4f1c1e0c-7d0a-4a53-9a57-2f1f3e8d6b11".parse().unwrap(),
            name: "Acme Server.exe".to_string(),
        };
        let path = logger.file_for(&server, date);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Acme Server.exe-4f1c1e0c-2024-03-09.log"
        );

        let path = logger.file_for(&LogTarget::System, date);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "_system-2024-03-09.log"
        );
    }

    #[tokio::test]
    async fn test_same_file_name_targets_keep_separate_logs() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let first = target("app.exe");
        let second = target("app.exe");

        logger.record(&first, LogLevel::Info, "from /opt/a");
        logger.record(&second, LogLevel::Info, "from /opt/b");

        let page = logger
            .read_recent(&first, LogPageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.lines.len(), 1);
        assert!(page.lines[0].ends_with("from /opt/a"));

        assert_eq!(logger.clear(&first).await.unwrap(), 1);
        let page = logger
            .read_recent(&second, LogPageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.lines.len(), 1);
        assert!(page.lines[0].ends_with("from /opt/b"));
    }

    #[tokio::test]
    async fn test_system_entries_go_to_system_file() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();

        logger.record_system(LogLevel::System, "watchdog started");
        logger.flush().await;

        let content =
            std::fs::read_to_string(logger.current_file(&LogTarget::System)).unwrap();
        assert!(content.contains("[SYSTEM] watchdog started"));
    }

    #[tokio::test]
    async fn test_multiline_message_is_flattened() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let app = target("app");

        logger.record(&app, LogLevel::Error, "launch failed\ndetail: no such file");
        logger.flush().await;

        let content = std::fs::read_to_string(logger.current_file(&app)).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let mut events = logger.subscribe();

        // A directory squatting on the daily file name makes the append fail
        let app = target("blocked");
        std::fs::create_dir_all(logger.current_file(&app)).unwrap();

        logger.record(&app, LogLevel::Info, "still delivered");
        logger.flush().await;

        let entry = events.try_recv().unwrap();
        assert_eq!(entry.message, "still delivered");

        // The writer keeps serving other targets
        let other = target("other");
        logger.record(&other, LogLevel::Info, "written");
        logger.flush().await;
        assert!(logger.current_file(&other).exists());
    }

    #[tokio::test]
    async fn test_live_stream_receives_entries() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let mut events = logger.subscribe();

        logger.record_system(LogLevel::System, "bulk stop");

        let entry = events.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::System);
        assert_eq!(entry.target, LogTarget::System);
    }

    #[tokio::test]
    async fn test_clear_removes_only_that_target() {
        let temp_dir = TempDir::new().unwrap();
        let logger = TargetLogger::new(temp_dir.path()).unwrap();
        let a = target("a.exe");
        let b = target("b.exe");

        logger.record(&a, LogLevel::Info, "one");
        logger.record(&b, LogLevel::Info, "two");
        logger.flush().await;
        std::fs::write(
            logger.file_for(&a, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
            "[old] [INFO] older\n",
        )
        .unwrap();

        assert_eq!(logger.clear(&a).await.unwrap(), 2);
        assert!(!logger.current_file(&a).exists());
        assert!(logger.current_file(&b).exists());

        // Writing after a clear starts a fresh file
        logger.record(&a, LogLevel::Info, "again");
        let page = logger.read_recent(&a, LogPageRequest::default()).await.unwrap();
        assert_eq!(page.lines.len(), 1);
        assert!(page.lines[0].ends_with("again"));
    }

    #[test]
    fn test_logger_needs_runtime() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            TargetLogger::new(temp_dir.path()),
            Err(WatchdogError::LogError(_))
        ));
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_file_stem("  "), "unnamed");
        assert_eq!(sanitize_file_stem("My App.exe"), "My App.exe");
    }

    #[test]
    fn test_level_round_trip() {
        for level in [
            LogLevel::Check,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Success,
            LogLevel::System,
            LogLevel::Debug,
        ] {
            assert_eq!(LogLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(LogLevel::parse("TRACE"), None);
    }
}
