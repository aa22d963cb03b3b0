// Logs module - Per-target activity logs and read-back

pub mod reader;
pub mod writer;

pub use reader::{LogLine, LogPage, LogPageRequest, LogView};
pub use writer::{sanitize_file_stem, LogEntry, LogLevel, LogTarget, TargetLogger};
