//! The caller's pointer to its current session.
//!
//! `login` records which session this terminal is using in a small JSON
//! file under the data directory; later invocations read it to know which
//! session id to validate. It holds only the session id and username —
//! never the token identifier or the secret.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle file name in the data directory.
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: i64,
    pub username: String,
    pub saved_at: DateTime<Utc>,
}

pub struct HandleStore {
    data_dir: PathBuf,
}

impl HandleStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Load the current handle, `None` if this terminal has no session.
    pub fn load(&self) -> Result<Option<SessionHandle>> {
        let path = self.handle_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&path).context("Failed to read session handle")?;
        let handle =
            serde_json::from_str(&contents).context("Failed to parse session handle")?;
        Ok(Some(handle))
    }

    pub fn save(&self, handle: &SessionHandle) -> Result<()> {
        let path = self.handle_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(handle)?;
        std::fs::write(path, contents).context("Failed to write session handle")?;
        Ok(())
    }

    /// Remove the handle. Clearing an absent handle is not an error.
    pub fn clear(&self) -> Result<()> {
        let path = self.handle_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session handle")?;
        }
        Ok(())
    }

    fn handle_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_load_clear_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = HandleStore::new(tmp.path().to_path_buf());

        assert!(store.load().unwrap().is_none());

        let handle = SessionHandle {
            session_id: 7,
            username: "alice".to_string(),
            saved_at: Utc::now(),
        };
        store.save(&handle).unwrap();

        let loaded = store.load().unwrap().expect("handle should exist");
        assert_eq!(loaded.session_id, 7);
        assert_eq!(loaded.username, "alice");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_handle_is_an_error_not_a_panic() {
        let tmp = TempDir::new().unwrap();
        let store = HandleStore::new(tmp.path().to_path_buf());
        std::fs::write(tmp.path().join("session.json"), "{not json").unwrap();

        assert!(store.load().is_err());
    }
}
