use chrono::{Duration as ChronoDuration, Local};
use procwatch::logs::{LogLevel, LogLine, LogPageRequest, LogTarget, LogView, TargetLogger};
use procwatch::process::TargetDescriptor;
use std::fs;
use tempfile::TempDir;

fn descriptor() -> TargetDescriptor {
    TargetDescriptor::new("/opt/acme/bin/acme-server", 5)
}

fn messages(lines: &[String]) -> Vec<String> {
    lines.iter().map(|l| LogLine::parse(l).message).collect()
}

#[tokio::test]
async fn test_written_lines_read_back_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let logger = TargetLogger::new(temp_dir.path()).unwrap();
    let target = descriptor();
    let log_target = LogTarget::for_target(&target);

    for i in 0..5 {
        logger.record_target(&target, LogLevel::Check, format!("check {}", i));
    }

    let page = logger
        .read_recent(&log_target, LogPageRequest::new(3, 0))
        .await
        .unwrap();

    assert_eq!(messages(&page.lines), vec!["check 4", "check 3", "check 2"]);
    assert_eq!(page.next_offset, Some(3));

    let rest = logger
        .read_recent(&log_target, LogPageRequest::new(3, 3))
        .await
        .unwrap();
    assert_eq!(rest.lines.len(), 2);
    assert_eq!(rest.next_offset, None);
}

#[tokio::test]
async fn test_paging_spans_daily_files() {
    let temp_dir = TempDir::new().unwrap();
    let logger = TargetLogger::new(temp_dir.path()).unwrap();
    let target = descriptor();
    let log_target = LogTarget::for_target(&target);

    let yesterday = Local::now().date_naive() - ChronoDuration::days(1);
    fs::write(
        logger.file_for(&log_target, yesterday),
        "[2024-01-01 10:00:00.000] [WARN] older one\n[2024-01-01 10:00:05.000] [WARN] older two\n",
    )
    .unwrap();

    logger.record_target(&target, LogLevel::Success, "today");

    let page = logger
        .read_recent(&log_target, LogPageRequest::new(10, 0))
        .await
        .unwrap();

    let parsed: Vec<LogLine> = page.lines.iter().map(|l| LogLine::parse(l)).collect();
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[0].message, "today");
    assert_eq!(parsed[0].level, Some(LogLevel::Success));
    assert_eq!(parsed[1].message, "older two");
    assert_eq!(parsed[2].message, "older one");
}

#[tokio::test]
async fn test_targets_sharing_a_file_name_stay_apart() {
    let temp_dir = TempDir::new().unwrap();
    let logger = TargetLogger::new(temp_dir.path()).unwrap();
    let staging = TargetDescriptor::new("/opt/staging/app.exe", 5);
    let production = TargetDescriptor::new("/opt/production/app.exe", 5);
    assert_eq!(staging.display_name(), production.display_name());

    logger.record_target(&staging, LogLevel::Warn, "staging is down");
    logger.record_target(&production, LogLevel::Check, "production is up");

    let view = logger
        .read_for(Some(&staging), LogPageRequest::default())
        .await
        .unwrap();
    match view {
        LogView::Lines(page) => assert_eq!(messages(&page.lines), vec!["staging is down"]),
        LogView::NoTargetSelected => panic!("expected lines"),
    }

    let staging_log = LogTarget::for_target(&staging);
    let production_log = LogTarget::for_target(&production);
    assert_ne!(
        logger.current_file(&staging_log),
        logger.current_file(&production_log)
    );

    assert_eq!(logger.clear(&staging_log).await.unwrap(), 1);
    let page = logger
        .read_recent(&production_log, LogPageRequest::default())
        .await
        .unwrap();
    assert_eq!(messages(&page.lines), vec!["production is up"]);
}

#[tokio::test]
async fn test_no_target_selected_view() {
    let temp_dir = TempDir::new().unwrap();
    let logger = TargetLogger::new(temp_dir.path()).unwrap();

    assert_eq!(
        logger.read_for(None, LogPageRequest::default()).await.unwrap(),
        LogView::NoTargetSelected
    );
}

#[tokio::test]
async fn test_target_without_logs_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let logger = TargetLogger::new(temp_dir.path()).unwrap();

    match logger
        .read_for(Some(&descriptor()), LogPageRequest::default())
        .await
        .unwrap()
    {
        LogView::Lines(page) => {
            assert!(page.lines.is_empty());
            assert_eq!(page.next_offset, None);
        }
        LogView::NoTargetSelected => panic!("expected lines"),
    }
}

#[tokio::test]
async fn test_system_log_kept_apart() {
    let temp_dir = TempDir::new().unwrap();
    let logger = TargetLogger::new(temp_dir.path()).unwrap();
    let target = descriptor();

    logger.record_system(LogLevel::System, "Watchdog started with 1 target(s)");
    logger.record_target(&target, LogLevel::Check, "acme-server is running");
    logger.flush().await;

    let system = fs::read_to_string(logger.current_file(&LogTarget::System)).unwrap();
    assert!(system.contains("[SYSTEM] Watchdog started with 1 target(s)"));
    assert!(!system.contains("acme-server is running"));

    let cleared = logger.clear(&LogTarget::for_target(&target)).await.unwrap();
    assert_eq!(cleared, 1);
    assert!(logger.current_file(&LogTarget::System).exists());
}
