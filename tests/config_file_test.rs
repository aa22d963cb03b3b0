// Integration test for settings file support

use procwatch::config::WatchdogConfig;
use procwatch::error::WatchdogError;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("procwatch.toml");

    let toml_content = r#"
        max_targets = 3
        verify_delay_secs = 10
        default_interval_secs = 30
        log_dir = "/var/log/procwatch"
        targets_file = "/var/lib/procwatch/targets.toml"
        pid_file = "/run/procwatch.pid"
    "#;

    fs::write(&config_path, toml_content).unwrap();

    let config = WatchdogConfig::from_file(&config_path).unwrap();
    assert_eq!(config.max_targets, 3);
    assert_eq!(config.verify_delay(), Duration::from_secs(10));
    assert_eq!(config.default_interval_secs, 30);
    assert_eq!(config.log_dir, PathBuf::from("/var/log/procwatch"));
    assert_eq!(
        config.targets_file,
        PathBuf::from("/var/lib/procwatch/targets.toml")
    );
    assert_eq!(config.pid_file, PathBuf::from("/run/procwatch.pid"));
    assert_eq!(config.event_capacity, 256);
}

#[test]
fn test_load_json_config_with_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("procwatch.json");

    fs::write(&config_path, r#"{ "max_targets": 8 }"#).unwrap();

    let config = WatchdogConfig::from_file(&config_path).unwrap();
    let defaults = WatchdogConfig::default();

    assert_eq!(config.max_targets, 8);
    assert_eq!(config.verify_delay_secs, defaults.verify_delay_secs);
    assert_eq!(config.log_dir, defaults.log_dir);
    assert_eq!(config.scheduler().max_targets, 8);
}

#[test]
fn test_env_vars_expanded_in_paths() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("procwatch.toml");

    std::env::set_var("PROCWATCH_IT_ROOT", "/srv/watch");
    fs::write(
        &config_path,
        r#"
        log_dir = "${PROCWATCH_IT_ROOT}/logs"
        targets_file = "$PROCWATCH_IT_ROOT/targets.json"
        "#,
    )
    .unwrap();

    let config = WatchdogConfig::from_file(&config_path).unwrap();
    assert_eq!(config.log_dir, PathBuf::from("/srv/watch/logs"));
    assert_eq!(config.targets_file, PathBuf::from("/srv/watch/targets.json"));
}

#[test]
fn test_unsupported_extension() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("procwatch.yaml");
    fs::write(&config_path, "max_targets: 3").unwrap();

    assert!(matches!(
        WatchdogConfig::from_file(&config_path),
        Err(WatchdogError::InvalidConfig(_))
    ));
}

#[test]
fn test_invalid_values_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("procwatch.toml");
    fs::write(&config_path, "default_interval_secs = 1").unwrap();

    assert!(matches!(
        WatchdogConfig::from_file(&config_path),
        Err(WatchdogError::ConfigValidationError(_))
    ));
}

#[test]
fn test_malformed_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("procwatch.toml");
    fs::write(&config_path, "max_targets = = 3").unwrap();

    assert!(matches!(
        WatchdogConfig::from_file(&config_path),
        Err(WatchdogError::InvalidConfig(_))
    ));
}

#[test]
fn test_load_without_path_uses_defaults() {
    assert_eq!(WatchdogConfig::load(None).unwrap(), WatchdogConfig::default());
}
