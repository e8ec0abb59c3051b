//! Store configuration
//!
//! Read from `config.toml` in the platform config directory:
//! - Linux:   `~/.config/channote/config.toml`
//! - macOS:   `~/Library/Application Support/dev.channote.channote/config.toml`
//! - Windows: `{FOLDERID_RoamingAppData}\channote\channote\config\config.toml`
//!
//! Every field is optional; a missing file means all defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::models::DEFAULT_USER;

/// Key the state document is stored under
pub const DEFAULT_STORAGE_KEY: &str = "channel-chat-app-state";

/// Quiet period before the editor commits a draft
pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 500;

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "channote.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Slot key of the persisted state document
    pub storage_key: String,
    /// Author for new messages when the stored state names none
    pub default_user: String,
    /// Editor autosave debounce, in milliseconds
    pub autosave_delay_ms: u64,
    /// Explicit database file; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            default_user: DEFAULT_USER.to_string(),
            autosave_delay_ms: DEFAULT_AUTOSAVE_DELAY_MS,
            database_path: None,
        }
    }
}

impl StoreConfig {
    /// Load from the platform config directory
    pub fn load_default() -> Result<Self> {
        match project_dirs() {
            Some(dirs) => Self::load(dirs.config_dir().join(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit file. A missing file yields the defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    /// Database file to open: the configured one, or `channote.db` in the
    /// platform data directory.
    pub fn database_path(&self) -> std::result::Result<PathBuf, StorageError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dirs = project_dirs().ok_or(StorageError::NoDataDir)?;
        Ok(dirs.data_dir().join(DATABASE_FILE))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "channote", "channote")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_user = \"ada\"\nautosave_delay_ms = 250\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.default_user, "ada");
        assert_eq!(config.autosave_delay(), Duration::from_millis(250));
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn test_explicit_database_path() {
        let config = StoreConfig::from_toml("database_path = \"/tmp/x/notes.db\"").unwrap();
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/x/notes.db")
        );
    }

    #[test]
    fn test_malformed_file() {
        let err = StoreConfig::from_toml("autosave_delay_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
