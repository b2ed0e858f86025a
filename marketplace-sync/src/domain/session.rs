//! Signed-in user context passed to write operations.

use std::fmt;

use super::UserId;

/// Bearer token issued by the media API login endpoint.
///
/// The token is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw token for building request headers.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// True when the token is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// The signed-in user performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Signed-in user.
    pub user_id: UserId,
    /// Token presented to the media API.
    pub token: AuthToken,
}

impl Session {
    /// Build a session for `user_id`.
    pub fn new(user_id: UserId, token: AuthToken) -> Self {
        Self { user_id, token }
    }
}
