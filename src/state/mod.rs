// State module - Persistent storage for the target list

use crate::error::{Result, WatchdogError};
use crate::process::TargetDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Version of the targets file format
const TARGETS_VERSION: &str = "1.0.0";

/// Loads and saves the set of target descriptors
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Vec<TargetDescriptor>>;

    fn save(&self, targets: &[TargetDescriptor]) -> Result<()>;
}

/// On-disk document holding every target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsDocument {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub targets: Vec<TargetDescriptor>,
}

impl TargetsDocument {
    pub fn new(targets: Vec<TargetDescriptor>) -> Self {
        Self {
            version: TARGETS_VERSION.to_string(),
            last_updated: Utc::now(),
            targets,
        }
    }

    /// Validate the document structure
    pub fn validate(&self) -> Result<()> {
        if self.version != TARGETS_VERSION {
            return Err(WatchdogError::InvalidConfig(format!(
                "Incompatible targets file version: expected {}, found {}",
                TARGETS_VERSION, self.version
            )));
        }

        let mut seen_ids = HashSet::new();
        let mut seen_paths = HashSet::new();
        for target in &self.targets {
            if !seen_ids.insert(target.id) {
                return Err(WatchdogError::InvalidConfig(format!(
                    "Duplicate target ID found: {}",
                    target.id
                )));
            }

            if !seen_paths.insert(&target.executable_path) {
                return Err(WatchdogError::InvalidConfig(format!(
                    "Duplicate executable path found: {}",
                    target.executable_path.display()
                )));
            }
        }

        Ok(())
    }
}

impl Default for TargetsDocument {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

/// File-backed store; `.toml` files are written as TOML, anything else as JSON
pub struct FileConfigStore {
    path: PathBuf,
    format: Format,
}

impl FileConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Format::Toml,
            _ => Format::Json,
        };

        Self { path, format }
    }

    /// Read the full document; a missing file is an empty document
    pub fn load_document(&self) -> Result<TargetsDocument> {
        if !self.path.exists() {
            return Ok(TargetsDocument::default());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            WatchdogError::ConfigLoadError(format!("Failed to read targets file: {}", e))
        })?;

        let document: TargetsDocument = match self.format {
            Format::Json => serde_json::from_str(&contents).map_err(|e| {
                WatchdogError::ConfigLoadError(format!("Failed to parse targets file: {}", e))
            })?,
            Format::Toml => toml::from_str(&contents).map_err(|e| {
                WatchdogError::ConfigLoadError(format!("Failed to parse targets file: {}", e))
            })?,
        };

        document.validate()?;
        Ok(document)
    }

    /// Write the document atomically (temp file + rename)
    pub fn save_document(&self, document: &TargetsDocument) -> Result<()> {
        document.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    WatchdogError::ConfigPersistError(format!(
                        "Failed to create targets directory: {}",
                        e
                    ))
                })?;
            }
        }

        let serialized = match self.format {
            Format::Json => serde_json::to_string_pretty(document).map_err(|e| {
                WatchdogError::ConfigPersistError(format!("Failed to serialize targets: {}", e))
            })?,
            Format::Toml => toml::to_string_pretty(document).map_err(|e| {
                WatchdogError::ConfigPersistError(format!("Failed to serialize targets: {}", e))
            })?,
        };

        let temp_path = self.path.with_extension("tmp");

        {
            let file = File::create(&temp_path).map_err(|e| {
                WatchdogError::ConfigPersistError(format!("Failed to create temp targets file: {}", e))
            })?;

            let mut writer = BufWriter::new(file);
            writer.write_all(serialized.as_bytes()).map_err(|e| {
                WatchdogError::ConfigPersistError(format!("Failed to write targets file: {}", e))
            })?;
            writer.flush().map_err(|e| {
                WatchdogError::ConfigPersistError(format!("Failed to flush targets file: {}", e))
            })?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            WatchdogError::ConfigPersistError(format!("Failed to rename temp targets file: {}", e))
        })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Vec<TargetDescriptor>> {
        Ok(self.load_document()?.targets)
    }

    fn save(&self, targets: &[TargetDescriptor]) -> Result<()> {
        self.save_document(&TargetsDocument::new(targets.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_targets() -> Vec<TargetDescriptor> {
        let mut custom = TargetDescriptor::new("/opt/acme/worker", 60).with_auto_relaunch(false);
        custom.working_directory = Some(PathBuf::from("/var/lib/acme"));
        custom.display_name = Some("Worker".to_string());

        vec![TargetDescriptor::new("/opt/acme/Acme Server.exe", 5), custom]
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp_dir.path().join("targets.json"));

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp_dir.path().join("targets.json"));
        let targets = sample_targets();

        store.save(&targets).unwrap();
        assert_eq!(store.load().unwrap(), targets);
        assert!(!temp_dir.path().join("targets.tmp").exists());
    }

    #[test]
    fn test_toml_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp_dir.path().join("targets.toml"));
        let targets = sample_targets();

        store.save(&targets).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("[[targets]]"));
        assert_eq!(store.load().unwrap(), targets);
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp_dir.path().join("nested").join("targets.json"));

        store.save(&sample_targets()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_rejects_duplicate_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp_dir.path().join("targets.json"));
        let targets = vec![
            TargetDescriptor::new("/opt/app", 5),
            TargetDescriptor::new("/opt/app", 10),
        ];

        assert!(matches!(
            store.save(&targets),
            Err(WatchdogError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("targets.json");
        fs::write(
            &path,
            r#"{ "version": "0.1.0", "last_updated": "2024-01-01T00:00:00Z", "targets": [] }"#,
        )
        .unwrap();

        let store = FileConfigStore::new(&path);
        assert!(matches!(store.load(), Err(WatchdogError::InvalidConfig(_))));
    }

    #[test]
    fn test_corrupted_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("targets.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileConfigStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(WatchdogError::ConfigLoadError(_))
        ));
    }
}
