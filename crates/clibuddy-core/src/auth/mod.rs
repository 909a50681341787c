//! Authentication: the gatekeeper, the secret vault, and the session handle.
//!
//! This module provides:
//! - `AuthGatekeeper`: login/validate/logout across the session store and vault
//! - `SecretVault`: OS-keyring secret storage behind a trait seam
//! - `HandleStore`: the CLI-side pointer to the current session

pub mod gatekeeper;
pub mod handle;
pub mod vault;

pub use gatekeeper::{AuthGatekeeper, OsRngTokens, TokenSource, ValidatedIdentity};
pub use handle::{HandleStore, SessionHandle};
pub use vault::{KeyringVault, MemoryVault, SecretVault, VaultError};
