// Output formatting and display for CLI

use crate::logs::{LogLevel, LogLine, LogPage};
use crate::process::{StatusEvent, TargetDescriptor, TargetId, TargetSnapshot, TargetStatus};
use chrono::{DateTime, Local};
use colored::*;
use std::collections::HashMap;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a success message
pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print the summary of a newly registered target
pub fn print_added(descriptor: &TargetDescriptor) {
    println!("{}", "✓ Target added".green().bold());
    println!("  {}: {}", "ID".bold(), descriptor.id);
    println!("  {}: {}", "Name".bold(), descriptor.display_name().cyan());
    println!(
        "  {}: {}",
        "Path".bold(),
        descriptor.executable_path.display()
    );
    println!(
        "  {}: {}",
        "Interval".bold(),
        format_interval(descriptor.check_interval_secs)
    );
    println!(
        "  {}: {}",
        "Relaunch".bold(),
        if descriptor.auto_relaunch { "on" } else { "off" }
    );
}

/// Print a formatted table of targets
///
/// `Status` is the watchdog's own view of each target. `running` holds the
/// result of a one-off probe per target; targets missing from it are shown
/// as unknown.
pub fn print_target_table(targets: &[TargetSnapshot], running: &HashMap<TargetId, bool>) {
    if targets.is_empty() {
        println!("{}", "No targets are registered".yellow());
        return;
    }

    #[derive(Tabled)]
    struct TargetRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Path")]
        path: String,
        #[tabled(rename = "Interval")]
        interval: String,
        #[tabled(rename = "Relaunch")]
        relaunch: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Process")]
        process: String,
    }

    let rows: Vec<TargetRow> = targets
        .iter()
        .map(|t| {
            let d = &t.descriptor;
            TargetRow {
                id: short_id(&d.id),
                name: truncate(&d.display_name(), 24),
                path: truncate(&d.executable_path.display().to_string(), 40),
                interval: format_interval(d.check_interval_secs),
                relaunch: if d.auto_relaunch { "on" } else { "off" }.to_string(),
                status: format_status_colored(t.status),
                process: format_probe_colored(running.get(&d.id).copied()),
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Total: {} target(s)", targets.len())
            .dimmed()
            .italic()
    );
}

/// Print one live status change
pub fn print_status_event(name: &str, event: &StatusEvent) {
    let status = if event.stopped {
        TargetStatus::NotMonitoring
    } else if event.is_running {
        TargetStatus::Running
    } else if event.status_label == TargetStatus::Unknown.label() {
        TargetStatus::Unknown
    } else {
        TargetStatus::NotRunning
    };

    println!(
        "{} {} {}",
        format!("[{}]", format_last_checked(event.last_checked_at.as_ref())).dimmed(),
        name.cyan(),
        format_status_colored(status)
    );
}

/// Print a page of log lines with level coloring
pub fn print_log_page(page: &LogPage) {
    if page.lines.is_empty() {
        println!("{}", "No logs available".yellow());
        return;
    }

    println!("\n{}", "Logs".bold().underline());
    println!();

    for line in &page.lines {
        println!("{}", format_log_line(line));
    }

    println!();
    if let Some(next) = page.next_offset {
        println!(
            "{}",
            format!("More lines available, use --offset {}", next)
                .dimmed()
                .italic()
        );
    }
}

fn format_log_line(raw: &str) -> String {
    let line = LogLine::parse(raw);
    let Some(level) = line.level else {
        return raw.to_string();
    };

    let tag = format!("[{}]", level);
    let tag = match level {
        LogLevel::Check => tag.bright_black(),
        LogLevel::Info => tag.blue(),
        LogLevel::Warn => tag.yellow(),
        LogLevel::Error => tag.red().bold(),
        LogLevel::Success => tag.green().bold(),
        LogLevel::System => tag.magenta(),
        LogLevel::Debug => tag.dimmed(),
    };

    match line.timestamp {
        Some(ts) => format!("{} {} {}", format!("[{}]", ts).dimmed(), tag, line.message),
        None => format!("{} {}", tag, line.message),
    }
}

fn format_status_colored(status: TargetStatus) -> String {
    match status {
        TargetStatus::Running => status.label().green().to_string(),
        TargetStatus::NotRunning => status.label().red().bold().to_string(),
        TargetStatus::Unknown => status.label().yellow().to_string(),
        TargetStatus::NotMonitoring => status.label().bright_black().to_string(),
    }
}

fn format_probe_colored(running: Option<bool>) -> String {
    match running {
        Some(true) => format_status_colored(TargetStatus::Running),
        Some(false) => format_status_colored(TargetStatus::NotRunning),
        None => format_status_colored(TargetStatus::Unknown),
    }
}

/// `HH:MM:SS` of the last check, or "never"
fn format_last_checked(at: Option<&DateTime<Local>>) -> String {
    match at {
        Some(at) => at.format("%H:%M:%S").to_string(),
        None => "never".to_string(),
    }
}

/// Format a check interval in human-readable format
pub fn format_interval(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

fn short_id(id: &TargetId) -> String {
    id.to_string().chars().take(8).collect()
}

/// Truncate a string to a maximum number of characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(5), "5s");
        assert_eq!(format_interval(90), "1m 30s");
        assert_eq!(format_interval(600), "10m");
        assert_eq!(format_interval(3600), "1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
        assert_eq!(truncate("Überwachung.exe", 8), "Überw...");
    }

    #[test]
    fn test_format_last_checked() {
        assert_eq!(format_last_checked(None), "never");

        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(format_last_checked(Some(&at)), "09:05:07");
    }

    #[test]
    fn test_short_id() {
        let id: TargetId = "4f1c1e0c-7d0a-4a53-9a57-2f1f3e8d6b11".parse().unwrap();
        assert_eq!(short_id(&id), "4f1c1e0c");
    }

    #[test]
    fn test_format_log_line_keeps_message() {
        colored::control::set_override(false);

        let raw = "[2024-03-01 09:05:07.123] [WARN] app.exe is not running";
        assert_eq!(format_log_line(raw), raw);
        assert_eq!(format_log_line("free text"), "free text");
    }
}
