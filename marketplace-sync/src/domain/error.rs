//! Domain-level error types.
//!
//! These errors are transport agnostic. Consumers branch on [`ErrorCode`] to
//! decide between a retry affordance, a re-authentication prompt, or nothing
//! at all (a conflicting toggle).

use serde::{Deserialize, Serialize};

use crate::domain::ports::CatalogueSourceError;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Transport failed; the caller may retry.
    Network,
    /// Token missing or expired; the user must sign in again.
    Unauthorized,
    /// The API failed or answered with something unusable.
    Server,
    /// A favourite toggle for the same user and listing is already in flight.
    Conflict,
    /// The listing is not in the cached catalogue.
    NotFound,
}

impl ErrorCode {
    const fn fallback_message(self) -> &'static str {
        match self {
            Self::Network => "network request failed",
            Self::Unauthorized => "authentication required",
            Self::Server => "server error",
            Self::Conflict => "operation already in flight",
            Self::NotFound => "not found",
        }
    }
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` is non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use marketplace_sync::domain::{Error, ErrorCode};
///
/// let err = Error::conflict("favourite toggle already pending");
/// assert_eq!(err.code(), ErrorCode::Conflict);
/// assert!(err.is_conflict());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[serde(try_from = "ErrorDto", into = "ErrorDto")]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
}

/// Validation errors emitted by [`Error::try_new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorValidationError {
    /// The message was empty or whitespace.
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl Error {
    /// Create a new error. A blank message is replaced by the code's default
    /// description.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::try_new(code, message).unwrap_or_else(|_| Self {
            code,
            message: code.fallback_message().to_owned(),
        })
    }

    /// Fallible constructor that validates the message content.
    pub fn try_new(code: ErrorCode, message: impl Into<String>) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self { code, message })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Whether a caller-driven retry may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code == ErrorCode::Network
    }

    /// Whether this is an "already in flight" signal rather than a failure.
    pub fn is_conflict(&self) -> bool {
        self.code == ErrorCode::Conflict
    }

    /// Convenience constructor for [`ErrorCode::Network`].
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Convenience constructor for [`ErrorCode::Server`].
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Server, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl From<CatalogueSourceError> for Error {
    fn from(error: CatalogueSourceError) -> Self {
        let message = error.to_string();
        match error {
            CatalogueSourceError::Network { .. } => Self::network(message),
            CatalogueSourceError::Auth { .. } => Self::unauthorized(message),
            CatalogueSourceError::Server { .. } => Self::server(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: ErrorCode,
    message: String,
}

impl From<Error> for ErrorDto {
    fn from(value: Error) -> Self {
        Self {
            code: value.code,
            message: value.message,
        }
    }
}

impl TryFrom<ErrorDto> for Error {
    type Error = ErrorValidationError;

    fn try_from(value: ErrorDto) -> Result<Self, Self::Error> {
        Self::try_new(value.code, value.message)
    }
}
