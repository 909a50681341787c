//! Application configuration management.
//!
//! Configuration is stored at `~/.config/clibuddy/config.json`. Everything
//! has a default, so a missing file is a working configuration. The data
//! directory holds the session store, the session handle, and the plugin
//! directory unless individually overridden.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths.
const APP_NAME: &str = "clibuddy";

/// Config file name.
const CONFIG_FILE: &str = "config.json";

/// Session store file name.
const STORE_FILE: &str = "clibuddy.db";

/// Session lifetime when the config does not specify one.
const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes a session stays valid after login.
    pub session_ttl_minutes: i64,

    /// Create unknown users on first login instead of rejecting them.
    pub auto_register: bool,

    /// Overrides the default data directory (store, session handle, plugins).
    pub data_dir: Option<PathBuf>,

    /// Overrides `<data_dir>/plugins`.
    pub plugin_dir: Option<PathBuf>,

    /// Plugin command names allowed to opt out of the authentication gate.
    pub exempt_allowlist: Vec<String>,

    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            auto_register: false,
            data_dir: None,
            plugin_dir: None,
            exempt_allowlist: Vec::new(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(STORE_FILE))
    }

    pub fn plugin_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.plugin_dir {
            return Ok(dir.clone());
        }
        Ok(self.data_dir()?.join("plugins"))
    }

    /// Session TTL as a duration; nonsense values clamp to one minute.
    pub fn session_ttl(&self) -> Duration {
        Duration::minutes(self.session_ttl_minutes.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_the_default_config() {
        let config = Config::load_from(Path::new("/no/such/config.json")).unwrap();
        assert_eq!(config.session_ttl_minutes, DEFAULT_SESSION_TTL_MINUTES);
        assert!(!config.auto_register);
        assert!(config.exempt_allowlist.is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"session_ttl_minutes": 120}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.session_ttl_minutes, 120);
        assert!(!config.auto_register);
    }

    #[test]
    fn overrides_win_over_derived_paths() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/buddy-data")),
            plugin_dir: Some(PathBuf::from("/tmp/buddy-plugins")),
            ..Config::default()
        };
        assert_eq!(config.store_path().unwrap(), PathBuf::from("/tmp/buddy-data/clibuddy.db"));
        assert_eq!(config.plugin_dir().unwrap(), PathBuf::from("/tmp/buddy-plugins"));
    }

    #[test]
    fn ttl_clamps_to_a_minute() {
        let config = Config {
            session_ttl_minutes: -5,
            ..Config::default()
        };
        assert_eq!(config.session_ttl(), Duration::minutes(1));
    }
}
