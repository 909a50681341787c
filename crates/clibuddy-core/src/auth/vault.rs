//! Secret vault adapters.
//!
//! Vault entries are addressed exactly by a session's token identifier.
//! Secret values never leave this module in logs, error messages, or any
//! other persisted form.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Keyring service name for vault entries.
const SERVICE_NAME: &str = "clibuddy";

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("secret vault unavailable: {0}")]
    Unavailable(String),
}

/// Opaque key/value secret storage.
pub trait SecretVault {
    /// Store a secret, overwriting any existing entry under `key`.
    fn put(&self, key: &str, secret: &str) -> Result<(), VaultError>;

    /// Fetch a secret; `None` if no entry exists under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, VaultError>;

    /// Remove an entry. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), VaultError>;
}

/// Vault backed by the OS credential store (Keychain, Secret Service,
/// Windows Credential Manager) via the keyring crate.
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(&self.service, key).map_err(|e| VaultError::Unavailable(e.to_string()))
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretVault for KeyringVault {
    fn put(&self, key: &str, secret: &str) -> Result<(), VaultError> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| VaultError::Unavailable(e.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::Unavailable(e.to_string())),
        }
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::Unavailable(e.to_string())),
        }
    }
}

/// In-memory vault used by tests and other keyring-less environments.
#[derive(Default)]
pub struct MemoryVault {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecretVault for MemoryVault {
    fn put(&self, key: &str, secret: &str) -> Result<(), VaultError> {
        self.lock().insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_roundtrip() {
        let vault = MemoryVault::new();
        vault.put("tok-1", "secret-value").unwrap();
        assert_eq!(vault.get("tok-1").unwrap().as_deref(), Some("secret-value"));

        vault.delete("tok-1").unwrap();
        assert_eq!(vault.get("tok-1").unwrap(), None);
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let vault = MemoryVault::new();
        vault.put("tok-1", "first").unwrap();
        vault.put("tok-1", "second").unwrap();
        assert_eq!(vault.get("tok-1").unwrap().as_deref(), Some("second"));
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let vault = MemoryVault::new();
        vault.delete("never-existed").unwrap();
        vault.put("tok-1", "secret").unwrap();
        vault.delete("tok-1").unwrap();
        vault.delete("tok-1").unwrap();
        assert!(vault.is_empty());
    }
}
