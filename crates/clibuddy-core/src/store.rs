//! SQLite-backed store for user and session metadata.
//!
//! Tables:
//! - `users`: username, argon2 password hash, active flag
//! - `sessions`: token identifier, owning user, login/expiry timestamps
//!
//! No secret material lives here: `sessions.token_id` addresses the vault
//! entry, it is not the secret. Every gatekeeper call runs its reads and
//! writes inside one immediate transaction via [`SessionStore::with_tx`], so
//! a concurrent invocation can never observe a half-updated session.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use thiserror::Error;
use tracing::debug;

/// How long SQLite waits on a lock held by a concurrent invocation.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Extended result codes for UNIQUE violations; rusqlite's `ErrorCode` only
/// exposes the primary `ConstraintViolation` code, which also covers FK and
/// CHECK failures that must not be treated as retryable conflicts.
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    token_id TEXT NOT NULL UNIQUE,
    login_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    CHECK (expires_at > login_at)
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
";

#[derive(Error, Debug)]
pub enum StoreError {
    /// UNIQUE-constraint violation (duplicate username or token identifier).
    /// Distinguished so the gatekeeper can retry token generation without
    /// retrying the whole login.
    #[error("conflict: value already exists")]
    Conflict,

    /// The database is locked by a concurrent invocation.
    #[error("session store is busy")]
    Busy,

    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY
                )
            {
                return StoreError::Conflict;
            }
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
                return StoreError::Busy;
            }
        }
        StoreError::Unavailable(e.to_string())
    }
}

/// A user row. `password_hash` is an argon2 PHC string, never the raw password.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A session row. `token_id` is the vault lookup key, not the secret.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_id: String,
    pub login_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("cannot create {}: {e}", parent.display())))?;
        }
        Self::init(Connection::open(path)?)
    }

    /// In-memory store, private to this process.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL mode for concurrent invocations + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn })
    }

    /// Run `f` inside one IMMEDIATE transaction: committed when `f` returns
    /// `Ok`, rolled back when it returns `Err`. Retried once if the database
    /// is locked by a concurrent invocation, then the error surfaces.
    pub fn with_tx<T>(
        &mut self,
        mut f: impl FnMut(&StoreTx) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match Self::run_tx(&mut self.conn, &mut f) {
            Err(StoreError::Busy) => {
                debug!("session store busy, retrying once");
                Self::run_tx(&mut self.conn, &mut f)
            }
            other => other,
        }
    }

    fn run_tx<T>(
        conn: &mut Connection,
        f: &mut impl FnMut(&StoreTx) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let guard = StoreTx(tx);
        let out = f(&guard)?;
        guard.0.commit()?;
        Ok(out)
    }
}

/// Row operations available inside a [`SessionStore::with_tx`] transaction.
pub struct StoreTx<'c>(rusqlite::Transaction<'c>);

impl StoreTx<'_> {
    pub fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = self
            .0
            .query_row(
                "SELECT id, username, email, password_hash, created_at, is_active
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let user = self
            .0
            .query_row(
                "SELECT id, username, email, password_hash, created_at, is_active
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Insert a user; `Conflict` if the username is taken.
    pub fn insert_user(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.0.execute(
            "INSERT INTO users (username, email, password_hash, created_at, is_active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![username, email, password_hash, created_at.timestamp()],
        )?;
        Ok(self.0.last_insert_rowid())
    }

    /// Toggle the active flag. Returns false if the user does not exist.
    pub fn set_user_active(&self, username: &str, active: bool) -> Result<bool, StoreError> {
        let changed = self.0.execute(
            "UPDATE users SET is_active = ?1 WHERE username = ?2",
            params![active, username],
        )?;
        Ok(changed > 0)
    }

    pub fn user_count(&self) -> Result<i64, StoreError> {
        let count = self
            .0
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Pre-insert collision check for freshly minted token identifiers. The
    /// unique constraint on insert stays authoritative under races; this
    /// check exists so a colliding mint never reaches the vault, where a
    /// `put` would overwrite the existing session's secret.
    pub fn token_id_exists(&self, token_id: &str) -> Result<bool, StoreError> {
        let exists = self.0.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE token_id = ?1)",
            params![token_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Insert a session row; `Conflict` if the token identifier is taken.
    pub fn insert_session(
        &self,
        user_id: i64,
        token_id: &str,
        login_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.0.execute(
            "INSERT INTO sessions (user_id, token_id, login_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                token_id,
                login_at.timestamp(),
                expires_at.timestamp()
            ],
        )?;
        Ok(self.0.last_insert_rowid())
    }

    pub fn session_by_id(&self, id: i64) -> Result<Option<SessionRecord>, StoreError> {
        let session = self
            .0
            .query_row(
                "SELECT id, user_id, token_id, login_at, expires_at
                 FROM sessions WHERE id = ?1",
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Delete a session row. Returns false if it was already gone.
    pub fn delete_session(&self, id: i64) -> Result<bool, StoreError> {
        let deleted = self
            .0
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn session_count_for_user(&self, user_id: i64) -> Result<i64, StoreError> {
        let count = self.0.query_row(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: ts(row.get(4)?),
        is_active: row.get(5)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token_id: row.get(2)?,
        login_at: ts(row.get(3)?),
        expires_at: ts(row.get(4)?),
    })
}

/// Timestamps are stored as unix seconds; out-of-range values collapse to
/// the epoch rather than panicking.
fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
