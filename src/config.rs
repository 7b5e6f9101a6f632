//! Engine configuration
//!
//! Read from `~/.config/flowdesk/config.yml` (platform config dir) unless a
//! path is given. A missing file means defaults.

use crate::core::DEFAULT_DATE_FORMAT;
use anyhow::Result;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory for run history, relative to the working directory
const HISTORY_DIR: &str = ".flowdesk/runs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine name reported in logs and run history
    pub name: String,
    /// chrono pattern for date form input
    pub date_format: String,
    /// Where run history is written
    pub history_dir: PathBuf,
    /// Record each run to `history_dir`
    pub record_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            history_dir: PathBuf::from(HISTORY_DIR),
            record_history: true,
        }
    }
}

impl EngineConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flowdesk")
            .join("config.yml")
    }

    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        if config.date_format.trim().is_empty()
            || StrftimeItems::new(&config.date_format).any(|item| item == Item::Error)
        {
            anyhow::bail!(
                "Invalid date_format '{}' in {}",
                config.date_format,
                path.display()
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.date_format, "%Y-%m-%d");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "name: review-desk\nrecord_history: false\n").unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.name, "review-desk");
        assert!(!config.record_history);
        assert_eq!(config.history_dir, PathBuf::from(".flowdesk/runs"));
    }

    #[test]
    fn test_empty_date_format_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "date_format: \"\"\n").unwrap();
        assert!(EngineConfig::load_from(&path).is_err());

        std::fs::write(&path, "date_format: \"%Y-%Q\"\n").unwrap();
        assert!(EngineConfig::load_from(&path).is_err());
    }
}
