// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use railsnipe_core::{ErrorClass, RailsnipeError, SessionKey, UpstreamError};
use thiserror::Error;

/// Why a session could not be acquired.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider refused or failed the login.
    #[error("login failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// No login is stored for the key.
    #[error("no stored login for {0}")]
    MissingCredentials(SessionKey),

    /// The session store, key ring, or credential source failed.
    #[error(transparent)]
    Backend(#[from] RailsnipeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The classification the retry scheduler should act on.
    ///
    /// Store and key ring trouble is retried like a network failure; a
    /// missing login can never succeed and counts as invalid credentials.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Upstream(e) => e.class,
            Self::MissingCredentials(_) => ErrorClass::InvalidCredentials,
            Self::Backend(_) | Self::Internal(_) => ErrorClass::TransientNetwork,
        }
    }

    pub fn to_upstream(&self) -> UpstreamError {
        match self {
            Self::Upstream(e) => e.clone(),
            other => UpstreamError::new(other.class(), other.to_string()),
        }
    }
}

impl From<AuthError> for RailsnipeError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Upstream(e) => RailsnipeError::Upstream(e),
            AuthError::MissingCredentials(key) => RailsnipeError::Auth {
                key: key.to_string(),
                message: "no stored login".to_string(),
            },
            AuthError::Backend(e) => e,
            AuthError::Internal(msg) => RailsnipeError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railsnipe_core::Provider;

    #[test]
    fn classes_drive_retry_handling() {
        let missing = AuthError::MissingCredentials(SessionKey::new("alice", Provider::Srt));
        assert_eq!(missing.class(), ErrorClass::InvalidCredentials);
        assert!(missing.to_upstream().message.contains("alice"));

        let backend = AuthError::Backend(RailsnipeError::Vault("locked".into()));
        assert_eq!(backend.class(), ErrorClass::TransientNetwork);

        let upstream = AuthError::Upstream(UpstreamError::from_message("존재하지않는 회원입니다"));
        assert_eq!(upstream.to_upstream().class, ErrorClass::InvalidCredentials);
    }
}
