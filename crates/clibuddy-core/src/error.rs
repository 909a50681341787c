use thiserror::Error;

use crate::auth::vault::VaultError;
use crate::store::StoreError;

/// Errors surfaced by the authentication gatekeeper.
///
/// The first five variants are authentication decisions; the rest are
/// infrastructure failures from the underlying stores.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user, disabled user, or wrong password. A single message for
    /// all three so login failures cannot be used to enumerate usernames.
    #[error("invalid username or password")]
    NotAuthenticated,

    #[error("session has expired - please login again")]
    SessionExpired,

    #[error("session has been revoked - please login again")]
    SessionRevoked,

    /// The session row exists but its vault secret is gone.
    #[error("session secret is missing from the vault - please login again")]
    SecretMissing,

    #[error("user account is disabled")]
    UserInactive,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for authentication decisions, false for infrastructure failures.
    /// The CLI uses this to pick between the auth exit code and a plain failure.
    pub fn is_auth_failure(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Vault(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_distinguished_from_infrastructure() {
        assert!(AuthError::NotAuthenticated.is_auth_failure());
        assert!(AuthError::SessionExpired.is_auth_failure());
        assert!(AuthError::SecretMissing.is_auth_failure());
        assert!(!AuthError::Store(StoreError::Busy).is_auth_failure());
        assert!(!AuthError::Vault(VaultError::Unavailable("gone".into())).is_auth_failure());
    }

    #[test]
    fn login_failures_share_one_message() {
        // Unknown user and bad password must be indistinguishable to the caller.
        assert_eq!(
            AuthError::NotAuthenticated.to_string(),
            "invalid username or password"
        );
    }
}
