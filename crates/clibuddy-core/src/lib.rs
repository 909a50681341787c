//! Core library for CLI Buddy.
//!
//! The trust boundary of the tool lives here: an authentication gatekeeper
//! that reconciles session rows in a local SQLite store with opaque secrets
//! in the OS keyring, and a plugin registry that extends the command table
//! from user-supplied manifests without letting a broken plugin take the
//! host down. The `clibuddy-cli` crate wires these into the actual binary.

pub mod auth;
pub mod config;
pub mod error;
pub mod plugins;
pub mod store;
pub mod util;

pub use auth::{
    AuthGatekeeper, HandleStore, KeyringVault, MemoryVault, SecretVault, SessionHandle,
    ValidatedIdentity,
};
pub use config::Config;
pub use error::AuthError;
pub use plugins::{CommandEntry, CommandKind, CommandTable, PluginDescriptor, PluginRegistry};
pub use store::{SessionRecord, SessionStore, StoreError};
