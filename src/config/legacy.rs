// Import of the single-target INI files written by earlier watchdog releases

use crate::error::{Result, WatchdogError};
use crate::process::TargetDescriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

type IniSections = HashMap<String, HashMap<String, String>>;

/// Parse `[Section]` / `key=value` content; `;` and `#` start comment lines
pub fn parse_ini(content: &str) -> IniSections {
    let mut sections = IniSections::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        // Keys outside any section are ignored
        let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        sections
            .entry(section.clone())
            .or_default()
            .insert(key.to_string(), value.trim().to_string());
    }

    sections
}

/// Convert the `[Process]` section into a target descriptor
///
/// `checkInterval` is stored in milliseconds and rounded up to whole
/// seconds; when absent `default_interval_secs` is used.
///
/// A `processName` that differs from the executable's file name only becomes
/// the display name. Liveness is still checked against the file name, and a
/// warning says so.
pub fn descriptor_from_ini(content: &str, default_interval_secs: u64) -> Result<TargetDescriptor> {
    let sections = parse_ini(content);
    let process = sections
        .get("Process")
        .ok_or_else(|| WatchdogError::InvalidConfig("missing [Process] section".to_string()))?;

    let exe_path = process
        .get("exePath")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| WatchdogError::InvalidConfig("missing exePath in [Process]".to_string()))?;

    let interval_secs = match process.get("checkInterval") {
        Some(raw) => {
            let millis: u64 = raw.parse().map_err(|_| {
                WatchdogError::InvalidConfig(format!("checkInterval is not a number: {}", raw))
            })?;
            millis.div_ceil(1000)
        }
        None => default_interval_secs,
    };

    let mut descriptor = TargetDescriptor::new(PathBuf::from(exe_path), interval_secs);

    if let Some(dir) = process.get("workingDirectory").filter(|d| !d.is_empty()) {
        descriptor.working_directory = Some(PathBuf::from(dir));
    }

    if let Some(name) = process.get("processName").filter(|n| !n.is_empty()) {
        let process_name = descriptor.process_name();
        if *name != process_name {
            warn!(
                "processName {:?} is kept as the display name only; liveness is checked against {:?}",
                name, process_name
            );
            descriptor.display_name = Some(name.clone());
        }
    }

    descriptor.validate()?;
    Ok(descriptor)
}

/// Read and convert a legacy INI file
pub fn import_ini(path: &Path, default_interval_secs: u64) -> Result<TargetDescriptor> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WatchdogError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;

    descriptor_from_ini(&content, default_interval_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = "# watchdog configuration\n\
        \n\
        [Process]\n\
        \n\
        ; full path of the executable\n\
        exePath=/opt/acme/bin/Acme Server.exe\n\
        \n\
        checkInterval=30000\n\
        description=monitored program\n";

    #[test]
    fn test_parse_ini_sections_and_comments() {
        let sections = parse_ini(LEGACY);
        let process = &sections["Process"];

        assert_eq!(process["exePath"], "/opt/acme/bin/Acme Server.exe");
        assert_eq!(process["checkInterval"], "30000");
        assert_eq!(process.len(), 3);
    }

    #[test]
    fn test_descriptor_from_ini() {
        let descriptor = descriptor_from_ini(LEGACY, 5).unwrap();

        assert_eq!(
            descriptor.executable_path,
            PathBuf::from("/opt/acme/bin/Acme Server.exe")
        );
        assert_eq!(descriptor.check_interval_secs, 30);
        assert_eq!(descriptor.display_name(), "Acme Server.exe");
        assert_eq!(descriptor.working_directory(), PathBuf::from("/opt/acme/bin"));
        assert!(descriptor.auto_relaunch);
    }

    #[test]
    fn test_interval_rounds_up_and_defaults() {
        let descriptor =
            descriptor_from_ini("[Process]\nexePath=/opt/app\ncheckInterval=7500\n", 5).unwrap();
        assert_eq!(descriptor.check_interval_secs, 8);

        let descriptor = descriptor_from_ini("[Process]\nexePath=/opt/app\n", 12).unwrap();
        assert_eq!(descriptor.check_interval_secs, 12);
    }

    #[test]
    fn test_interval_out_of_bounds() {
        let result = descriptor_from_ini("[Process]\nexePath=/opt/app\ncheckInterval=1000\n", 5);
        assert!(matches!(result, Err(WatchdogError::InvalidInterval { value: 1, .. })));
    }

    #[test]
    fn test_missing_exe_path() {
        assert!(matches!(
            descriptor_from_ini("[Process]\ncheckInterval=5000\n", 5),
            Err(WatchdogError::InvalidConfig(_))
        ));
        assert!(matches!(
            descriptor_from_ini("exePath=/opt/app\n", 5),
            Err(WatchdogError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_explicit_overrides() {
        let content = "[Process]\n\
            exePath=/opt/app/run.exe\n\
            workingDirectory=/var/lib/app\n\
            processName=Runner\n";

        let descriptor = descriptor_from_ini(content, 5).unwrap();
        assert_eq!(descriptor.working_directory(), PathBuf::from("/var/lib/app"));
        assert_eq!(descriptor.display_name(), "Runner");
    }

    #[test]
    fn test_process_name_only_renames() {
        let content = "[Process]\n\
            exePath=/opt/app/launcher.exe\n\
            processName=worker.exe\n";

        let descriptor = descriptor_from_ini(content, 5).unwrap();
        assert_eq!(descriptor.display_name.as_deref(), Some("worker.exe"));
        // The process table is still searched for the executable's own name
        assert_eq!(descriptor.process_name(), "launcher.exe");

        let same = "[Process]\nexePath=/opt/app/launcher.exe\nprocessName=launcher.exe\n";
        assert_eq!(descriptor_from_ini(same, 5).unwrap().display_name, None);
    }
}
