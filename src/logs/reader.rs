use crate::error::{Result, WatchdogError};
use crate::logs::writer::LogLevel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Bytes read per step when tailing a file from its end
const TAIL_CHUNK_SIZE: u64 = 8 * 1024;

/// Which slice of a target's history to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPageRequest {
    /// Maximum number of lines in the page
    pub limit: usize,
    /// Lines to skip, counted from the newest line
    pub offset: usize,
}

impl Default for LogPageRequest {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

impl LogPageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

/// One page of raw log lines, most recent first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    pub lines: Vec<String>,
    /// Offset of the following page, `None` once history is exhausted
    pub next_offset: Option<usize>,
}

/// What the log pane shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogView {
    NoTargetSelected,
    Lines(LogPage),
}

/// A stored line split back into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: Option<String>,
    pub level: Option<LogLevel>,
    pub message: String,
}

impl LogLine {
    /// Parse `[timestamp] [LEVEL] message`, falling back to a bare message
    pub fn parse(line: &str) -> Self {
        let (timestamp, rest) = match split_bracket(line) {
            Some((inner, rest)) => (Some(inner.to_string()), rest),
            None => {
                return Self {
                    timestamp: None,
                    level: None,
                    message: line.to_string(),
                }
            }
        };

        match split_bracket(rest).and_then(|(tag, msg)| LogLevel::parse(tag).map(|l| (l, msg))) {
            Some((level, message)) => Self {
                timestamp,
                level: Some(level),
                message: message.to_string(),
            },
            None => Self {
                timestamp,
                level: None,
                message: rest.to_string(),
            },
        }
    }
}

fn split_bracket(s: &str) -> Option<(&str, &str)> {
    let s = s.strip_prefix('[')?;
    let end = s.find(']')?;
    Some((&s[..end], s[end + 1..].trim_start()))
}

/// Daily files written under `stem`, newest first
pub async fn daily_files(log_dir: &Path, stem: &str) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(log_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(WatchdogError::LogError(format!(
                "Failed to read log directory: {}",
                e
            )))
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WatchdogError::LogError(format!("Failed to read log directory: {}", e)))?
    {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some(date) = parse_daily_name(file_name, stem) {
            files.push((date, path));
        }
    }

    files.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(files)
}

/// Match `<stem>-YYYY-MM-DD.log`
fn parse_daily_name(file_name: &str, stem: &str) -> Option<NaiveDate> {
    let base = file_name.strip_suffix(".log")?;
    let date_part = base.strip_prefix(stem)?.strip_prefix('-')?;

    // Another target's stem may start with ours, so the rest must be only a date
    if date_part.len() != 10 {
        return None;
    }

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Up to `wanted` non-empty lines from the end of `path`, newest first
///
/// The file is read backwards in fixed-size chunks, so the cost depends on
/// the number of lines asked for rather than on the file size.
pub async fn tail_lines(path: &Path, wanted: usize) -> std::io::Result<Vec<String>> {
    let mut lines = Vec::new();
    if wanted == 0 {
        return Ok(lines);
    }

    let mut file = File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    // Start of a line whose beginning lies in a chunk not read yet
    let mut partial: Vec<u8> = Vec::new();

    while pos > 0 && lines.len() < wanted {
        let step = TAIL_CHUNK_SIZE.min(pos);
        pos -= step;

        let mut chunk = vec![0u8; step as usize];
        file.seek(SeekFrom::Start(pos)).await?;
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&partial);

        let mut segments: Vec<&[u8]> = chunk.split(|b| *b == b'\n').collect();
        let head = if pos > 0 && !segments.is_empty() {
            segments.remove(0).to_vec()
        } else {
            Vec::new()
        };

        for segment in segments.into_iter().rev() {
            push_line(&mut lines, segment);
            if lines.len() >= wanted {
                break;
            }
        }

        partial = head;
    }

    Ok(lines)
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches('\r');
    if !text.trim().is_empty() {
        lines.push(text.to_string());
    }
}

/// Read one page of a target's history, newest line first
///
/// Files are tailed newest to oldest and reading stops as soon as the page
/// (plus one look-ahead line) is filled.
pub async fn read_recent(log_dir: &Path, stem: &str, request: LogPageRequest) -> Result<LogPage> {
    if request.limit == 0 {
        return Ok(LogPage::default());
    }

    let wanted = request.offset + request.limit + 1;
    let mut newest_first: Vec<String> = Vec::new();

    for (_, path) in daily_files(log_dir, stem).await? {
        match tail_lines(&path, wanted - newest_first.len()).await {
            Ok(lines) => newest_first.extend(lines),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(WatchdogError::LogError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        if newest_first.len() >= wanted {
            break;
        }
    }

    let has_more = newest_first.len() > request.offset + request.limit;
    let lines: Vec<String> = newest_first
        .into_iter()
        .skip(request.offset)
        .take(request.limit)
        .collect();

    let next_offset = has_more.then(|| request.offset + lines.len());

    Ok(LogPage { lines, next_offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_day(dir: &Path, stem: &str, date: &str, lines: &[&str]) {
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(dir.join(format!("{}-{}.log", stem, date)), content).unwrap();
    }

    #[tokio::test]
    async fn test_read_recent_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let page = read_recent(
            &temp_dir.path().join("nope"),
            "app",
            LogPageRequest::default(),
        )
        .await
        .unwrap();

        assert!(page.lines.is_empty());
        assert_eq!(page.next_offset, None);
    }

    #[tokio::test]
    async fn test_read_recent_newest_first_across_days() {
        let temp_dir = TempDir::new().unwrap();
        write_day(temp_dir.path(), "app", "2024-01-01", &["d1-a", "d1-b"]);
        write_day(temp_dir.path(), "app", "2024-01-02", &["d2-a", "d2-b"]);

        let page = read_recent(temp_dir.path(), "app", LogPageRequest::new(3, 0))
            .await
            .unwrap();
        assert_eq!(page.lines, vec!["d2-b", "d2-a", "d1-b"]);
        assert_eq!(page.next_offset, Some(3));

        let page = read_recent(temp_dir.path(), "app", LogPageRequest::new(3, 3))
            .await
            .unwrap();
        assert_eq!(page.lines, vec!["d1-a"]);
        assert_eq!(page.next_offset, None);
    }

    #[tokio::test]
    async fn test_stem_prefix_does_not_leak() {
        let temp_dir = TempDir::new().unwrap();
        write_day(temp_dir.path(), "app", "2024-01-01", &["mine"]);
        write_day(temp_dir.path(), "app-helper", "2024-01-01", &["theirs"]);

        let page = read_recent(temp_dir.path(), "app", LogPageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.lines, vec!["mine"]);

        let files = daily_files(temp_dir.path(), "app").await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit() {
        let temp_dir = TempDir::new().unwrap();
        write_day(temp_dir.path(), "app", "2024-01-01", &["line"]);

        let page = read_recent(temp_dir.path(), "app", LogPageRequest::new(0, 0))
            .await
            .unwrap();
        assert!(page.lines.is_empty());
    }

    #[tokio::test]
    async fn test_tail_lines_spans_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.log");

        // Lines long enough that several straddle chunk boundaries
        let all: Vec<String> = (0..2_000)
            .map(|i| format!("[2024-01-01 10:00:00.000] [CHECK] line {:05} ÄÖÜ", i))
            .collect();
        std::fs::write(&path, format!("{}\n", all.join("\n"))).unwrap();

        let tail = tail_lines(&path, 3).await.unwrap();
        assert_eq!(tail, vec![all[1999].clone(), all[1998].clone(), all[1997].clone()]);

        let everything = tail_lines(&path, usize::MAX).await.unwrap();
        assert_eq!(everything.len(), 2_000);
        assert_eq!(everything[0], all[1999]);
        assert_eq!(everything[1999], all[0]);
    }

    #[tokio::test]
    async fn test_tail_lines_without_trailing_newline() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.log");
        std::fs::write(&path, "first\r\n\nsecond").unwrap();

        assert_eq!(tail_lines(&path, 10).await.unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn test_log_line_parse() {
        let line = LogLine::parse("[2024-01-01 10:00:00.000] [WARN] app.exe is not running");
        assert_eq!(line.timestamp.as_deref(), Some("2024-01-01 10:00:00.000"));
        assert_eq!(line.level, Some(LogLevel::Warn));
        assert_eq!(line.message, "app.exe is not running");
    }

    #[test]
    fn test_log_line_parse_unknown_tag() {
        let line = LogLine::parse("[2024-01-01 10:00:00.000] [NOISE] hello");
        assert_eq!(line.level, None);
        assert_eq!(line.message, "[NOISE] hello");

        let line = LogLine::parse("Plain message");
        assert_eq!(line.timestamp, None);
        assert_eq!(line.message, "Plain message");
    }
}
