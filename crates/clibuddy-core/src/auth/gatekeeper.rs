//! Authentication gatekeeper: decides whether a command may proceed.
//!
//! The gatekeeper coordinates two stores that cannot share a transaction:
//! the SQLite session store and the OS secret vault. Login writes the vault
//! entry first and compensates by deleting it if the row insert fails;
//! validate repairs any row/vault mismatch it encounters, so a process
//! killed mid-login leaves nothing behind that the next invocation cannot
//! clean up.

use argon2::password_hash::rand_core::OsRng as SaltRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use super::vault::{SecretVault, VaultError};
use crate::error::AuthError;
use crate::store::{SessionRecord, SessionStore, StoreError, UserRecord};

/// Attempts at minting a unique token identifier before giving up.
const MAX_TOKEN_ATTEMPTS: u32 = 3;

/// Token identifier length in bytes before hex encoding.
const TOKEN_BYTES: usize = 32;

/// Vault secret length in bytes before hex encoding.
const SECRET_BYTES: usize = 32;

/// Identity of a successfully validated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    pub user_id: i64,
    pub username: String,
    pub session_id: i64,
}

/// Source of fresh token identifiers and vault secrets. A seam so tests can
/// force identifier collisions; production draws from the OS CSPRNG.
pub trait TokenSource {
    fn token_id(&mut self) -> String;
    fn secret(&mut self) -> String;
}

/// Token material from the operating system CSPRNG, hex-encoded.
pub struct OsRngTokens;

impl TokenSource for OsRngTokens {
    fn token_id(&mut self) -> String {
        random_hex(TOKEN_BYTES)
    }

    fn secret(&mut self) -> String {
        random_hex(SECRET_BYTES)
    }
}

pub struct AuthGatekeeper<V: SecretVault> {
    store: SessionStore,
    vault: V,
    ttl: Duration,
    auto_register: bool,
    tokens: Box<dyn TokenSource + Send>,
}

enum ValidateOutcome {
    Valid(ValidatedIdentity),
    Revoked,
    Expired,
    SecretMissing,
    Inactive,
    VaultFailed(VaultError),
}

enum LogoutOutcome {
    Done,
    AlreadyGone,
    VaultFailed(VaultError),
}

impl<V: SecretVault> AuthGatekeeper<V> {
    pub fn new(store: SessionStore, vault: V, ttl: Duration) -> Self {
        Self {
            store,
            vault,
            ttl,
            auto_register: false,
            tokens: Box::new(OsRngTokens),
        }
    }

    /// Create unknown users on first login instead of rejecting them.
    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn with_token_source(mut self, tokens: Box<dyn TokenSource + Send>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Authenticate and open a new session.
    ///
    /// Unknown user, disabled user, and wrong password all fail with the
    /// same [`AuthError::NotAuthenticated`] message.
    pub fn login(&mut self, username: &str, password: &str) -> Result<SessionRecord, AuthError> {
        let user = match self.store.with_tx(|tx| tx.user_by_username(username))? {
            Some(user) => user,
            None if self.auto_register => self.register_on_first_login(username, password)?,
            None => {
                // Hash a throwaway so the unknown-user path costs the same
                // as a failed verification.
                let _ = hash_password(password);
                return Err(AuthError::NotAuthenticated);
            }
        };

        if !user.is_active || !verify_password(password, &user.password_hash) {
            return Err(AuthError::NotAuthenticated);
        }

        self.create_session(user.id)
    }

    /// Check that `session_id` names a live session whose vault secret is
    /// still present and whose owner is still active.
    ///
    /// Side effects: an expired session is deleted (lazy expiry); a session
    /// whose vault entry is gone is deleted (self-healing after tampering or
    /// a crash mid-login).
    pub fn validate(&mut self, session_id: i64) -> Result<ValidatedIdentity, AuthError> {
        let vault = &self.vault;
        let now = Utc::now();

        let outcome = self.store.with_tx(|tx| {
            let session = match tx.session_by_id(session_id)? {
                Some(session) => session,
                None => return Ok(ValidateOutcome::Revoked),
            };

            if now > session.expires_at {
                // Vault entry first, then the row: a row pointing at a dead
                // vault entry heals on the next validate, an orphaned vault
                // entry would not.
                if let Err(e) = vault.delete(&session.token_id) {
                    return Ok(ValidateOutcome::VaultFailed(e));
                }
                tx.delete_session(session_id)?;
                return Ok(ValidateOutcome::Expired);
            }

            match vault.get(&session.token_id) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tx.delete_session(session_id)?;
                    return Ok(ValidateOutcome::SecretMissing);
                }
                Err(e) => return Ok(ValidateOutcome::VaultFailed(e)),
            }

            let user = match tx.user_by_id(session.user_id)? {
                Some(user) => user,
                None => return Ok(ValidateOutcome::Revoked),
            };
            if !user.is_active {
                return Ok(ValidateOutcome::Inactive);
            }

            Ok(ValidateOutcome::Valid(ValidatedIdentity {
                user_id: user.id,
                username: user.username,
                session_id,
            }))
        })?;

        match outcome {
            ValidateOutcome::Valid(identity) => Ok(identity),
            ValidateOutcome::Revoked => Err(AuthError::SessionRevoked),
            ValidateOutcome::Expired => {
                debug!(session_id, "expired session removed");
                Err(AuthError::SessionExpired)
            }
            ValidateOutcome::SecretMissing => {
                warn!(session_id, "session row had no vault entry, removed");
                Err(AuthError::SecretMissing)
            }
            ValidateOutcome::Inactive => Err(AuthError::UserInactive),
            ValidateOutcome::VaultFailed(e) => Err(e.into()),
        }
    }

    /// End a session. Idempotent: an already-gone session is a success.
    pub fn logout(&mut self, session_id: i64) -> Result<(), AuthError> {
        let vault = &self.vault;

        let outcome = self.store.with_tx(|tx| {
            let session = match tx.session_by_id(session_id)? {
                Some(session) => session,
                None => return Ok(LogoutOutcome::AlreadyGone),
            };
            if let Err(e) = vault.delete(&session.token_id) {
                return Ok(LogoutOutcome::VaultFailed(e));
            }
            tx.delete_session(session_id)?;
            Ok(LogoutOutcome::Done)
        })?;

        match outcome {
            LogoutOutcome::Done => Ok(()),
            LogoutOutcome::AlreadyGone => {
                debug!(session_id, "logout: session already gone");
                Ok(())
            }
            LogoutOutcome::VaultFailed(e) => Err(e.into()),
        }
    }

    /// Pre-provision a user account. `Conflict` surfaces if the username is
    /// taken.
    pub fn register(
        &mut self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<i64, AuthError> {
        let hash = hash_password(password)?;
        let now = Utc::now();
        let id = self
            .store
            .with_tx(|tx| tx.insert_user(username, email, &hash, now))?;
        debug!(username, "user registered");
        Ok(id)
    }

    /// Soft-disable or re-enable an account. Returns false if the user does
    /// not exist. Disabling leaves session rows in place; they fail
    /// validation with [`AuthError::UserInactive`].
    pub fn set_user_active(&mut self, username: &str, active: bool) -> Result<bool, AuthError> {
        Ok(self
            .store
            .with_tx(|tx| tx.set_user_active(username, active))?)
    }

    pub fn user_count(&mut self) -> Result<i64, AuthError> {
        Ok(self.store.with_tx(|tx| tx.user_count())?)
    }

    fn register_on_first_login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let hash = hash_password(password)?;
        let created_at = Utc::now();
        match self
            .store
            .with_tx(|tx| tx.insert_user(username, None, &hash, created_at))
        {
            Ok(id) => {
                debug!(username, "registered user on first login");
                Ok(UserRecord {
                    id,
                    username: username.to_string(),
                    email: None,
                    password_hash: hash,
                    created_at,
                    is_active: true,
                })
            }
            // A concurrent invocation registered the same name first; verify
            // against what it stored.
            Err(StoreError::Conflict) => self
                .store
                .with_tx(|tx| tx.user_by_username(username))?
                .ok_or(AuthError::NotAuthenticated),
            Err(e) => Err(e.into()),
        }
    }

    /// Mint a token, write the secret, then insert the row. Minted
    /// identifiers are checked against existing sessions before the vault
    /// write; the unique constraint on `token_id` stays authoritative when
    /// a concurrent login races past the check, and a conflicting insert
    /// deletes its vault entry and retries with fresh material.
    fn create_session(&mut self, user_id: i64) -> Result<SessionRecord, AuthError> {
        let login_at = Utc::now();
        let expires_at = login_at + self.ttl;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token_id = self.tokens.token_id();

            // A colliding mint must never reach the vault: `put` overwrites,
            // which would clobber the existing session's secret.
            if self.store.with_tx(|tx| tx.token_id_exists(&token_id))? {
                debug!(attempt, "token identifier collision, retrying");
                continue;
            }

            let secret = self.tokens.secret();
            self.vault.put(&token_id, &secret)?;

            let inserted = self
                .store
                .with_tx(|tx| tx.insert_session(user_id, &token_id, login_at, expires_at));

            match inserted {
                Ok(id) => {
                    return Ok(SessionRecord {
                        id,
                        user_id,
                        token_id,
                        login_at,
                        expires_at,
                    })
                }
                Err(StoreError::Conflict) => {
                    self.vault.delete(&token_id)?;
                    debug!(attempt, "token identifier collision, retrying");
                }
                Err(e) => {
                    // Compensating action: never leave an orphaned secret.
                    if let Err(ve) = self.vault.delete(&token_id) {
                        warn!(error = %ve, "could not remove vault entry after store failure");
                    }
                    return Err(e.into());
                }
            }
        }

        Err(AuthError::Internal(
            "could not mint a unique session token".into(),
        ))
    }
}

// ── Crypto helpers ──────────────────────────────────────────────────

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Argon2id PHC-string hash with a fresh salt. Parameters are the crate
/// defaults and travel inside the hash string.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
}

/// Constant-time verification against a stored PHC string. An unparseable
/// hash fails closed.
fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
